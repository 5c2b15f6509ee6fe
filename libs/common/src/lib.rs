//! Common library for the club scheduler
//!
//! This crate provides shared infrastructure used by the services:
//! PostgreSQL connectivity, the Redis client, and error types.

pub mod cache;
pub mod database;
pub mod error;

/// Example usage of the database and cache modules
///
/// ```rust,no_run
/// use common::cache::{RedisConfig, RedisPool};
/// use common::database::{DatabaseConfig, health_check, init_pool};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env()?;
///     let pool = init_pool(&config).await?;
///     println!("Database health check: {}", health_check(&pool).await?);
///
///     let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
///     println!("Redis health check: {}", redis.health_check().await?);
///     Ok(())
/// }
/// ```
pub fn example_usage() {}
