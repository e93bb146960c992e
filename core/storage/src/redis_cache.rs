//! Redis-backed expiring cache.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::time::Duration;
use tracing::info;

use crate::cache::KvCache;
use onetime_common::{Error, Result};

fn storage_error(e: redis::RedisError) -> Error {
    Error::Storage(format!("Redis command failed: {}", e))
}

/// Redis cache reached through a reconnecting connection manager.
///
/// `take` runs `GET` and `DEL` inside a `MULTI`/`EXEC` transaction, so two
/// callers racing on the same key can never both receive the value.
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis://host:port/db`.
    ///
    /// # Errors
    /// - `Config` if the target cannot be expressed as a Redis URL
    /// - `Storage` if the server cannot be reached
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::Config(format!("Invalid Redis target: {}", e)))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to Redis: {}", e)))?;

        info!(host = %host, port, db, "Connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.manager.clone();

        let reply: RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await;
        reply.map_err(storage_error)
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();

        let reply: RedisResult<(Option<String>, i64)> = redis::pipe()
            .atomic()
            .get(key)
            .del(key)
            .query_async(&mut conn)
            .await;
        let (value, _removed) = reply.map_err(storage_error)?;
        Ok(value)
    }
}
