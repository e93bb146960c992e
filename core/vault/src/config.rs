//! Vault configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use onetime_common::{Error, Result};

/// Default bound on a single backend call.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;

fn default_io_timeout_ms() -> u64 {
    DEFAULT_IO_TIMEOUT_MS
}

/// Connection and expiry settings for the ephemeral cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralConfig {
    /// Redis host name.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Redis database index.
    pub db: i64,
    /// Lifetime of an unread secret, in seconds.
    pub ttl_secs: u64,
}

/// Location of the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableConfig {
    /// Path of the `token:ciphertext` file.
    pub path: PathBuf,
}

/// Everything the vault needs at startup.
///
/// All fields except the timeout are required; a missing or invalid value
/// is a startup error, never a request-time one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub ephemeral: EphemeralConfig,
    pub durable: DurableConfig,
    /// Bound on every backend call, in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl VaultConfig {
    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    /// - `Config` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.ephemeral.host.trim().is_empty() {
            return Err(Error::Config("Redis host must not be empty".to_string()));
        }
        if self.ephemeral.port == 0 {
            return Err(Error::Config("Redis port must not be 0".to_string()));
        }
        if self.ephemeral.db < 0 {
            return Err(Error::Config(format!(
                "Redis database index must not be negative, got {}",
                self.ephemeral.db
            )));
        }
        if self.ephemeral.ttl_secs == 0 {
            return Err(Error::Config("Entry TTL must be at least one second".to_string()));
        }
        if self.durable.path.as_os_str().is_empty() {
            return Err(Error::Config("Storage file path must not be empty".to_string()));
        }
        if self.io_timeout_ms == 0 {
            return Err(Error::Config("I/O timeout must not be 0".to_string()));
        }
        Ok(())
    }

    /// Ephemeral entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ephemeral.ttl_secs)
    }

    /// Bound on a single backend call.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VaultConfig {
        VaultConfig {
            ephemeral: EphemeralConfig {
                host: "localhost".to_string(),
                port: 6379,
                db: 0,
                ttl_secs: 3600,
            },
            durable: DurableConfig {
                path: PathBuf::from("storage.txt"),
            },
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl(), Duration::from_secs(3600));
        assert_eq!(config.io_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_fields_rejected() {
        let mut c = config();
        c.ephemeral.host = " ".to_string();
        assert!(matches!(c.validate(), Err(Error::Config(_))));

        let mut c = config();
        c.ephemeral.port = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.ephemeral.ttl_secs = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.durable.path = PathBuf::new();
        assert!(c.validate().is_err());

        let mut c = config();
        c.io_timeout_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_json_defaults_timeout() {
        let json = r#"{
            "ephemeral": {"host": "cache", "port": 6380, "db": 2, "ttl_secs": 60},
            "durable": {"path": "/var/lib/onetime/storage.txt"}
        }"#;

        let config = VaultConfig::from_json(json).unwrap();
        assert_eq!(config.io_timeout_ms, DEFAULT_IO_TIMEOUT_MS);
        assert_eq!(config.ephemeral.db, 2);
    }

    #[test]
    fn test_json_missing_field_fails() {
        let json = r#"{"ephemeral": {"host": "cache", "port": 6380, "db": 0}}"#;
        assert!(matches!(VaultConfig::from_json(json), Err(Error::Config(_))));
    }
}
