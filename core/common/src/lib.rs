//! Common utilities and types shared across the onetime crates.
//!
//! This module provides the error taxonomy and the small value types
//! (tokens, storage modes, sealed secrets) that flow between the cipher,
//! the storage backends and the vault.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{SealedSecret, StoreMode, Token, TOKEN_LENGTH};
