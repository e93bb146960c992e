//! Key-value cache abstraction behind the ephemeral backend.

use async_trait::async_trait;
use std::time::Duration;

use onetime_common::Result;

/// A networked (or in-process) key-value cache with native per-key expiry.
///
/// Unlike `SecretBackend`, cache errors are returned as-is; the ephemeral
/// backend decides how to log and collapse them.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Get the cache name (e.g., "redis", "memory").
    fn name(&self) -> &str;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch and delete `key` in one atomic step.
    ///
    /// Expired and never-written keys both yield `Ok(None)`.
    async fn take(&self, key: &str) -> Result<Option<String>>;
}
