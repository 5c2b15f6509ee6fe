//! Redis cache module
//!
//! This module provides functionality for connecting to Redis and performing
//! the hash-map operations the scheduler keeps its live token table in.

use crate::error::{CacheError, CacheResult};
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (required)
    pub fn from_env() -> CacheResult<Self> {
        let url = std::env::var("REDIS_URL").map_err(|_| {
            CacheError::Configuration("REDIS_URL environment variable not set".to_string())
        })?;

        Ok(RedisConfig { url })
    }
}

/// Redis client handle
///
/// Cloning is cheap; every operation acquires a multiplexed connection and
/// releases it when the call returns.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis client
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone()).map_err(CacheError::Connection)?;
        info!("Redis client initialized");
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Connection)
    }

    /// Read every field of the hash stored at `key`
    pub async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut conn = self.get_connection().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(key).await.map_err(CacheError::Command)?;
        Ok(fields)
    }

    /// Set a single field of the hash stored at `key`
    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn
            .hset(key, field, value)
            .await
            .map_err(CacheError::Command)?;
        Ok(())
    }

    /// Delete a single field of the hash stored at `key`
    ///
    /// Returns whether the field existed.
    pub async fn hash_delete(&self, key: &str, field: &str) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.hdel(key, field).await.map_err(CacheError::Command)?;
        Ok(removed > 0)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(pong == "PONG")
    }
}
