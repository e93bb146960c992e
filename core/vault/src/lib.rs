//! Vault engine for onetime.
//!
//! This module provides:
//! - `Vault`: the put/get protocol tying key generation, encryption,
//!   backend routing and one-shot consumption together
//! - `VaultConfig`: startup configuration for both backends
//!
//! # Architecture
//! Backends are constructed once at startup and injected into the vault.
//! Request handlers share one `Vault` behind an `Arc`; the backends make
//! concurrent consumption of the same token safe.

pub mod config;
pub mod vault;

pub use config::{DurableConfig, EphemeralConfig, VaultConfig, DEFAULT_IO_TIMEOUT_MS};
pub use vault::Vault;
