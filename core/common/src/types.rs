//! Common types used throughout onetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an encoded token: 32 key bytes as unpadded base64url.
pub const TOKEN_LENGTH: usize = 43;

/// Retrieval token handed back to the caller on `put`.
///
/// The token is the encoded symmetric key of the secret and doubles as its
/// storage key. Whoever holds it can both locate and decrypt the secret, so
/// it is redacted from `Debug` output and zeroized on drop.
#[derive(Clone, PartialEq, Eq, Hash, Zeroize, ZeroizeOnDrop)]
pub struct Token(String);

impl Token {
    /// Parse a token string.
    ///
    /// # Preconditions
    /// - `raw` is exactly `TOKEN_LENGTH` characters from the base64url alphabet
    ///
    /// # Errors
    /// - Returns `Validation` if the length or alphabet is wrong
    pub fn parse(raw: &str) -> crate::Result<Self> {
        if raw.len() != TOKEN_LENGTH {
            return Err(crate::Error::Validation(format!(
                "Token must be {} characters, got {}",
                TOKEN_LENGTH,
                raw.len()
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::Validation(
                "Token contains characters outside the base64url alphabet".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Get the encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token([REDACTED])")
    }
}

/// Where a secret is kept until it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Networked cache with a TTL; unread secrets expire.
    #[serde(alias = "volatile")]
    Ephemeral,
    /// Append-only file; secrets live until read.
    #[serde(alias = "persistent")]
    Durable,
}

impl StoreMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Ephemeral => "ephemeral",
            StoreMode::Durable => "durable",
        }
    }
}

impl FromStr for StoreMode {
    type Err = crate::Error;

    /// Accepts the canonical names and the legacy `volatile`/`persistent` wire names.
    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ephemeral" | "volatile" => Ok(StoreMode::Ephemeral),
            "durable" | "persistent" => Ok(StoreMode::Durable),
            other => Err(crate::Error::Validation(format!(
                "Unsupported store mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encrypted secret together with the token that unlocks it.
///
/// The ciphertext is delimiter-safe: it never contains `:` or a newline.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub token: Token,
    pub ciphertext: String,
}
