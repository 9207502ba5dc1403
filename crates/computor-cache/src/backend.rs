//! Cache backend abstraction.
//!
//! The backend contract mirrors the primitive set the coherency scheme
//! actually needs from a shared key/value service: string get/set with TTL,
//! deletes, set primitives for the tag index, a counter for generational
//! invalidation, key scanning, and pipelined multi-command execution with
//! per-command ordering inside one pipeline.

use async_trait::async_trait;

use crate::error::CacheResult;

/// A single write command for pipelined execution.
///
/// [`crate::Cache::set_with_tags`] and [`crate::Cache::invalidate_tags`] batch
/// their index maintenance as one pipeline so the backend round-trip count
/// stays constant per operation. Partial success is acceptable: the tag index
/// is self-healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value with a TTL in seconds.
    SetEx {
        /// Full cache key.
        key:         String,
        /// Serialized payload.
        value:       String,
        /// Time-to-live in seconds.
        ttl_seconds: u64,
    },
    /// Delete one or more keys.
    Del {
        /// Keys to delete.
        keys: Vec<String>,
    },
    /// Add members to a set.
    SAdd {
        /// Set key.
        key:     String,
        /// Members to add.
        members: Vec<String>,
    },
    /// Remove members from a set.
    SRem {
        /// Set key.
        key:     String,
        /// Members to remove.
        members: Vec<String>,
    },
}

/// Key/value backend with set primitives and counters.
///
/// Object-safe; used as `Arc<dyn CacheBackend>` so the same [`crate::Cache`]
/// front-end runs against Redis in production and [`crate::MemoryBackend`] in
/// tests. The atomicity unit is a single command or one pipeline against a
/// single key; no cross-key ordering is guaranteed.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value by key. `Ok(None)` means absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value with a TTL in seconds, overwriting any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Delete keys. Missing keys are not an error.
    async fn del(&self, keys: &[String]) -> CacheResult<()>;

    /// Add members to the set at `key`.
    async fn sadd(&self, key: &str, members: &[String]) -> CacheResult<()>;

    /// Remove members from the set at `key`.
    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<()>;

    /// Return all members of the set at `key` (empty when absent).
    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Atomically increment the integer at `key`, returning the new value.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Return all keys matching a glob pattern. Backends page internally.
    async fn scan_match(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Execute commands as one pipeline with per-command ordering.
    async fn pipeline(&self, commands: Vec<Command>) -> CacheResult<()>;
}
