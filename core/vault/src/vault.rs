//! One-time secret vault.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::VaultConfig;
use onetime_common::{Error, Result, StoreMode, Token};
use onetime_crypto::{open, seal};
use onetime_storage::{DurableBackend, EphemeralBackend, KvCache, RedisCache, SecretBackend};

/// Ties the cipher to the two storage backends.
///
/// `put` encrypts under a fresh key and stores the ciphertext in the
/// backend chosen by the caller; the key comes back as the token. `get`
/// consumes the record from whichever backend holds it and decrypts it.
/// The vault never retries: a blind retry of `put` would mint a new token.
pub struct Vault {
    ephemeral: Arc<dyn SecretBackend>,
    durable: Arc<dyn SecretBackend>,
}

impl Vault {
    /// Create a vault over already constructed backends.
    pub fn new(ephemeral: Arc<dyn SecretBackend>, durable: Arc<dyn SecretBackend>) -> Self {
        Self { ephemeral, durable }
    }

    /// Validate `config`, connect to Redis and build both backends.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Storage` if Redis cannot be reached
    pub async fn open(config: &VaultConfig) -> Result<Self> {
        config.validate()?;
        let cache = RedisCache::connect(
            &config.ephemeral.host,
            config.ephemeral.port,
            config.ephemeral.db,
        )
        .await?;
        Self::with_cache(config, Arc::new(cache))
    }

    /// Build both backends from `config`, using `cache` for ephemeral secrets.
    pub fn with_cache(config: &VaultConfig, cache: Arc<dyn KvCache>) -> Result<Self> {
        config.validate()?;

        let ephemeral = EphemeralBackend::new(cache, config.ttl(), config.io_timeout());
        let durable = DurableBackend::new(&config.durable.path, config.io_timeout());

        info!(
            ttl_secs = config.ephemeral.ttl_secs,
            path = %config.durable.path.display(),
            "Vault backends ready"
        );
        Ok(Self::new(Arc::new(ephemeral), Arc::new(durable)))
    }

    fn backend(&self, mode: StoreMode) -> &dyn SecretBackend {
        match mode {
            StoreMode::Ephemeral => self.ephemeral.as_ref(),
            StoreMode::Durable => self.durable.as_ref(),
        }
    }

    /// Encrypt `plaintext` and store it in the backend selected by `mode`.
    ///
    /// # Postconditions
    /// - Returns the token; the record lives in exactly one backend
    ///
    /// # Errors
    /// - `Storage` if the backend did not accept the record
    pub async fn put(&self, mode: StoreMode, plaintext: &str) -> Result<Token> {
        let sealed = seal(plaintext)?;
        let backend = self.backend(mode);

        if !backend.store(&sealed.token, &sealed.ciphertext).await {
            return Err(Error::Storage(format!(
                "The {} backend failed to store the secret",
                backend.name()
            )));
        }

        info!(mode = %mode, size = plaintext.len(), "Secret stored");
        Ok(sealed.token)
    }

    /// Like [`Vault::put`], parsing the mode from its wire name first.
    ///
    /// # Errors
    /// - `Validation` for an unrecognized mode
    pub async fn put_str(&self, mode: &str, plaintext: &str) -> Result<Token> {
        let mode: StoreMode = mode.parse()?;
        self.put(mode, plaintext).await
    }

    /// Consume the secret behind `token` and return its plaintext.
    ///
    /// The ephemeral backend is tried first, then the durable one.
    ///
    /// # Errors
    /// - `NotFound` if neither backend holds the token, whether it never
    ///   existed, was already consumed or expired
    /// - `Decryption` if the stored record fails authentication; the record
    ///   has been consumed and cannot be retrieved again
    pub async fn get(&self, token: &str) -> Result<String> {
        let token = match Token::parse(token) {
            Ok(token) => token,
            Err(_) => {
                debug!("Rejected malformed token");
                return Err(Error::NotFound);
            }
        };

        for backend in [&self.ephemeral, &self.durable] {
            let Some(ciphertext) = backend.restore(&token).await else {
                continue;
            };

            return match open(token.as_str(), &ciphertext) {
                Ok(plaintext) => {
                    info!(backend = backend.name(), "Secret retrieved");
                    Ok(plaintext)
                }
                Err(e) => {
                    error!(
                        backend = backend.name(),
                        error = %e,
                        "Consumed secret failed to decrypt and is lost"
                    );
                    Err(e)
                }
            };
        }

        debug!("Secret not found in any backend");
        Err(Error::NotFound)
    }
}
