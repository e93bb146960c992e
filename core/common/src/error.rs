//! Common error types for onetime.

use thiserror::Error;

/// Top-level error type for onetime operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied a bad mode, token or missing field.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A backend failed to persist a secret.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No backend holds the token.
    ///
    /// Deliberately carries no detail: a token that never existed, one that
    /// was already consumed and one that expired all look the same.
    #[error("Secret not found")]
    NotFound,

    /// A stored secret could not be decrypted. The record is already gone.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Encryption or key handling failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Startup configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the operation that produced this error.
    ///
    /// Only write-side storage failures qualify. Retrying a `put` mints a new
    /// token, so the decision stays with the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
