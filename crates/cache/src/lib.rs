//! Courier in-process cache.
//!
//! - [`Cache`]: bounded key/value store with per-entry TTL, lazy expiry on
//!   read, idle-per-access eviction and a cancellable background sweep.
//! - [`namespaced`]: prefixed helpers for templates, user preferences and
//!   provider configuration with their own default TTLs.

pub mod cache;
pub mod namespaced;

pub use cache::{Cache, CacheConfig, CacheStats};
