//! Cryptographic primitives for onetime.
//!
//! This module provides:
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Per-secret random keys with automatic zeroization
//! - The `seal`/`open` pair that turns plaintext into a token plus
//!   delimiter-safe ciphertext and back
//!
//! # Security Guarantees
//! - Every secret gets a fresh 256-bit key from the OS RNG
//! - All key material is automatically zeroized on drop
//! - No plaintext, token or key material is ever logged

pub mod aead;
pub mod cipher;
pub mod keys;

pub use aead::{decrypt, encrypt};
pub use cipher::{open, seal};
pub use keys::{SecretKey, KEY_LENGTH};
