//! Tag-indexed write-through cache for the Computor coherency core.
//!
//! # Overview
//!
//! This crate implements the cache layer that sits between the API and
//! PostgreSQL: key/value storage with TTL, a bidirectional tag↔key index for
//! group invalidation, generational (version-bump) invalidation for
//! wide-fanout projections, and a user-view convenience API that codifies the
//! projection key/tag scheme.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ EntityRepository /   │
//! │ ViewRepository       │
//! └──────────┬───────────┘
//!            │ get / set_with_tags / invalidate_tags
//!            ↓
//! ┌──────────────────────┐
//! │ Cache                │  key algebra, tag index, stats
//! └──────────┬───────────┘
//!            │ GET / SETEX / SADD / SREM / SMEMBERS / INCR / pipeline
//!            ↓
//! ┌──────────────────────┐
//! │ CacheBackend         │  RedisBackend (shared) or MemoryBackend (tests)
//! └──────────────────────┘
//! ```
//!
//! # Invalidation model
//!
//! Every value stored via [`Cache::set_with_tags`] is indexed both ways:
//! `tag:{t}` is a set of keys bearing `t`, and `keytags:{key}` is the set of
//! tags the key carries. [`Cache::invalidate_tags`] walks the index and
//! deletes values, memberships, and the tag set itself; the walk is idempotent
//! and the index self-heals after partial failures, so no global lock is ever
//! required.
//!
//! # Failure semantics
//!
//! Every cache operation is best-effort. Any backend error downgrades to
//! "cache miss on read; skip store on write" with a log line — callers never
//! see a cache error, and the system stays correct with the backend fully
//! unreachable (bypass mode).

mod backend;
mod cache;
mod error;
mod keys;
mod memory;
mod redis_backend;
mod stats;
mod views;

pub use backend::{CacheBackend, Command};
pub use cache::Cache;
pub use error::{CacheError, CacheResult};
pub use keys::{params_hash, stable_key};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use stats::CacheStats;
pub use views::RelatedId;
