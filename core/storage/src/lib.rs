//! Storage backends for onetime.
//!
//! This module provides the `SecretBackend` capability and its two
//! implementations:
//! - `DurableBackend`: an append-only `token:ciphertext` file, consumed on read
//! - `EphemeralBackend`: a networked key-value cache with per-entry expiry,
//!   consumed on read
//!
//! # Design Principles
//! - Backends never surface raw I/O faults: writes report `false`, reads
//!   report a miss, and the cause is logged for operators
//! - A successful `restore` removes the record in the same operation
//! - Every backend call is bounded by an I/O timeout

pub mod backend;
pub mod cache;
pub mod durable;
pub mod ephemeral;
pub mod memory;
pub mod redis_cache;

pub use backend::SecretBackend;
pub use cache::KvCache;
pub use durable::DurableBackend;
pub use ephemeral::EphemeralBackend;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
