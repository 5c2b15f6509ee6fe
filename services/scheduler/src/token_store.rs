//! Live session token table held in Redis
//!
//! One Redis hash under a fixed key maps token -> decimal
//! `service_session_id`. The attendance-verification endpoint resolves
//! submitted tokens against the same hash.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use std::collections::HashMap;

/// Token -> session id table the reconciler maintains
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Full current mapping
    async fn entries(&self) -> Result<HashMap<String, String>>;

    /// Map `token` to `session_id`
    async fn insert(&self, token: &str, session_id: &str) -> Result<()>;

    /// Remove `token`; removing a missing token is not an error
    async fn remove(&self, token: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisTokenStore {
    redis_pool: RedisPool,
    key: String,
}

impl RedisTokenStore {
    pub fn new(redis_pool: RedisPool, key: impl Into<String>) -> Self {
        Self {
            redis_pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn entries(&self) -> Result<HashMap<String, String>> {
        Ok(self.redis_pool.hash_get_all(&self.key).await?)
    }

    async fn insert(&self, token: &str, session_id: &str) -> Result<()> {
        self.redis_pool.hash_set(&self.key, token, session_id).await?;
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<()> {
        self.redis_pool.hash_delete(&self.key, token).await?;
        Ok(())
    }
}
