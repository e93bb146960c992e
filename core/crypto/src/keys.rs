//! Per-secret key type with secure memory handling.
//!
//! The key automatically zeroizes its memory on drop to prevent
//! sensitive data from persisting in memory.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use onetime_common::{Error, Result, Token};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Symmetric key protecting exactly one secret.
///
/// Its unpadded base64url encoding is the retrieval token.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; KEY_LENGTH],
}

impl SecretKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Encode this key as a retrieval token.
    pub fn to_token(&self) -> Result<Token> {
        let encoded = Zeroizing::new(URL_SAFE_NO_PAD.encode(self.key));
        Token::parse(&encoded)
    }

    /// Decode a key from its token form.
    ///
    /// # Errors
    /// - Returns `Decryption` if the token is not valid base64url or does
    ///   not decode to exactly KEY_LENGTH bytes
    pub fn from_token(token: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(token)
                .map_err(|_| Error::Decryption("Malformed token".to_string()))?,
        );
        if decoded.len() != KEY_LENGTH {
            return Err(Error::Decryption(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                decoded.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}
