//! Secret backend trait definition.

use async_trait::async_trait;

use onetime_common::Token;

/// Storage capability shared by the durable and ephemeral backends.
///
/// Records are immutable once stored and consumed by the first successful
/// `restore`. Implementations must make `restore` atomic per token: when
/// several callers race on the same token exactly one of them gets the
/// ciphertext.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Get the backend name (e.g., "durable", "ephemeral").
    fn name(&self) -> &str;

    /// Persist a record.
    ///
    /// # Postconditions
    /// - Returns `true` only if the record is durably handed to the store
    /// - Returns `false` on any I/O failure or timeout; the cause is logged
    async fn store(&self, token: &Token, ciphertext: &str) -> bool;

    /// Look up a record by exact token match and remove it.
    ///
    /// # Postconditions
    /// - `Some(ciphertext)` means the record was found and is now gone
    /// - `None` means it was absent or the store could not be read; the
    ///   latter is logged distinctly
    async fn restore(&self, token: &Token) -> Option<String>;
}
