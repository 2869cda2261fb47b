//! Key-value store boundary used by the idempotency gate.
//!
//! The gate only needs a handful of string operations with TTLs. Anything
//! offering an atomic set-if-not-exists can back it: the in-process map for
//! single-instance deployments and tests, or Redis when several capture
//! instances sit behind a load balancer.

pub mod clock;
pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use crate::error::StoreResult;
use async_trait::async_trait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use in_memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// TTL-capable string store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value under `key`, or `None` when absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional write that expires after `ttl_secs`
    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> StoreResult<()>;

    /// Create `key` only if it does not exist. Returns `true` when this call
    /// created it. Must be atomic with respect to every other caller.
    async fn set_if_not_exists(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Replace the TTL of an existing key. No-op when the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;
}
