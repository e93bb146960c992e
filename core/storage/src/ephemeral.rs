//! Expiring secret storage on top of a key-value cache.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::backend::SecretBackend;
use crate::cache::KvCache;
use onetime_common::Token;

/// Ephemeral storage provider.
///
/// Every record is written with the configured TTL. Reading a record
/// removes it whether or not it is still there, so expired and consumed
/// tokens are indistinguishable.
pub struct EphemeralBackend {
    cache: Arc<dyn KvCache>,
    ttl: Duration,
    io_timeout: Duration,
}

impl EphemeralBackend {
    /// Create an ephemeral backend over `cache`.
    pub fn new(cache: Arc<dyn KvCache>, ttl: Duration, io_timeout: Duration) -> Self {
        Self {
            cache,
            ttl,
            io_timeout,
        }
    }
}

#[async_trait]
impl SecretBackend for EphemeralBackend {
    fn name(&self) -> &str {
        "ephemeral"
    }

    async fn store(&self, token: &Token, ciphertext: &str) -> bool {
        let write = self
            .cache
            .set_with_expiry(token.as_str(), ciphertext, self.ttl);

        match timeout(self.io_timeout, write).await {
            Ok(Ok(())) => {
                debug!(
                    backend = "ephemeral",
                    cache = self.cache.name(),
                    ttl_secs = self.ttl.as_secs(),
                    "Secret stored"
                );
                true
            }
            Ok(Err(e)) => {
                error!(
                    backend = "ephemeral",
                    cache = self.cache.name(),
                    error = %e,
                    "Failed to write secret to cache"
                );
                false
            }
            Err(_) => {
                error!(
                    backend = "ephemeral",
                    cache = self.cache.name(),
                    timeout_ms = self.io_timeout.as_millis() as u64,
                    "Timed out writing secret to cache"
                );
                false
            }
        }
    }

    async fn restore(&self, token: &Token) -> Option<String> {
        match timeout(self.io_timeout, self.cache.take(token.as_str())).await {
            Ok(Ok(found)) => {
                if found.is_some() {
                    debug!(backend = "ephemeral", cache = self.cache.name(), "Secret consumed");
                }
                found
            }
            Ok(Err(e)) => {
                warn!(
                    backend = "ephemeral",
                    cache = self.cache.name(),
                    error = %e,
                    "Failed to read secret from cache, reporting miss"
                );
                None
            }
            Err(_) => {
                warn!(
                    backend = "ephemeral",
                    cache = self.cache.name(),
                    timeout_ms = self.io_timeout.as_millis() as u64,
                    "Timed out reading secret from cache, reporting miss"
                );
                None
            }
        }
    }
}
