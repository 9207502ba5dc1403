//! Write-through cache with tag-based invalidation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{CacheBackend, Command};
use crate::stats::{CacheStats, Counters};
use crate::{keys, MemoryBackend};

/// Default TTL when neither the caller nor the constructor specifies one.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Write-through cache with tag-based invalidation.
///
/// Cheap to clone; all clones share one backend handle and one set of
/// counters. Every operation is best-effort: backend failures are logged and
/// downgraded (miss on read, no-op on write), never surfaced to callers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use computor_cache::{Cache, MemoryBackend};
///
/// # tokio_test::block_on(async {
/// let cache = Cache::new(Arc::new(MemoryBackend::new()), "computor", None);
///
/// let key = cache.entity_key("course", "c1");
/// cache
///     .set_with_tags(&key, &serde_json::json!({"title": "Prog 1"}), ["course:c1", "course:list"], None)
///     .await;
/// assert!(cache.get_by_key::<serde_json::Value>(&key).await.is_some());
///
/// cache.invalidate_tags(&["course:c1".to_string()]).await;
/// assert!(cache.get_by_key::<serde_json::Value>(&key).await.is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct Cache {
    backend:     Arc<dyn CacheBackend>,
    prefix:      String,
    default_ttl: Duration,
    counters:    Arc<Counters>,
}

impl Cache {
    /// Create a cache over `backend`, namespaced by `prefix`.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: &str, default_ttl: Option<Duration>) -> Self {
        Self {
            backend,
            prefix: prefix.to_string(),
            default_ttl: default_ttl.unwrap_or(DEFAULT_TTL),
            counters: Arc::new(Counters::default()),
        }
    }

    /// In-memory cache, used by tests and cache-less single-process setups.
    #[must_use]
    pub fn in_memory(prefix: &str) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), prefix, None)
    }

    // ========================================================================
    // Key algebra
    // ========================================================================

    /// Build a namespaced key from parts: `{prefix}:{part}:{part}:...`.
    #[must_use]
    pub fn k(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    /// Entity key for a scalar id: `{prefix}:{entity_type}:{id}`.
    #[must_use]
    pub fn entity_key(&self, entity_type: &str, id: &str) -> String {
        self.k(&[entity_type, id])
    }

    /// Entity key for a composite id, hashed via [`keys::stable_key`].
    #[must_use]
    pub fn composite_key<T: Serialize>(&self, entity_type: &str, id: &T) -> String {
        let hashed = keys::stable_key(id);
        self.k(&[entity_type, &hashed])
    }

    fn tag_key(&self, tag: &str) -> String {
        self.k(&["tag", tag])
    }

    fn keytags_key(&self, key: &str) -> String {
        self.k(&["keytags", key])
    }

    fn version_key(&self, tag: &str) -> String {
        self.k(&["ver", tag])
    }

    // ========================================================================
    // Plain key/value operations
    // ========================================================================

    /// Get a value by key, deserializing once per call.
    ///
    /// Returns `None` on absence, expiry, backend failure, or a payload that
    /// no longer deserializes — all four are indistinguishable misses.
    pub async fn get_by_key<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    debug!(key, "cache hit");
                    Some(value)
                },
                Err(err) => {
                    // Undecodable payload is a miss, never a request failure.
                    warn!(key, %err, "cache payload failed to deserialize; treating as miss");
                    self.counters.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    None
                },
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(key, "cache miss");
                None
            },
            Err(err) => {
                warn!(key, %err, "cache GET failed; treating as miss");
                self.counters.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            },
        }
    }

    /// Store a value with a TTL. No tag maintenance.
    ///
    /// Unserializable payloads are rejected here, at set time, with a log line.
    pub async fn set_by_key<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                error!(key, %err, "refusing to cache unserializable payload");
                return;
            },
        };
        match self.backend.set_ex(key, &raw, ttl.as_secs()).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(key, ttl_seconds = ttl.as_secs(), "cache set");
            },
            Err(err) => error!(key, %err, "cache SET failed"),
        }
    }

    /// Delete a key.
    ///
    /// Tag maintenance is deliberately not performed here: the tag index may
    /// briefly reference a missing key, and readers that follow a tag to a
    /// missing key treat it as already invalidated.
    pub async fn delete_by_key(&self, key: &str) {
        if let Err(err) = self.backend.del(&[key.to_string()]).await {
            error!(key, %err, "cache DELETE failed");
        }
    }

    // ========================================================================
    // Tag-based invalidation
    // ========================================================================

    /// Store a value and index it under `tags`.
    ///
    /// One pipelined request: SETEX the value, SADD the key into every
    /// `tag:{t}` set, SADD the tags into the key's `keytags` side-set. Partial
    /// success is acceptable — `invalidate_tags` self-heals the index.
    pub async fn set_with_tags<T, I, S>(&self, key: &str, value: &T, tags: I, ttl: Option<Duration>)
    where
        T: Serialize,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: HashSet<String> =
            tags.into_iter().map(Into::into).filter(|t| !t.is_empty()).collect();

        if tags.is_empty() {
            self.set_by_key(key, value, ttl).await;
            return;
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                error!(key, %err, "refusing to cache unserializable payload");
                return;
            },
        };

        let mut commands = vec![Command::SetEx {
            key:         key.to_string(),
            value:       raw,
            ttl_seconds: ttl.as_secs(),
        }];
        for tag in &tags {
            commands.push(Command::SAdd {
                key:     self.tag_key(tag),
                members: vec![key.to_string()],
            });
        }
        commands.push(Command::SAdd {
            key:     self.keytags_key(key),
            members: tags.iter().cloned().collect(),
        });

        match self.backend.pipeline(commands).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(key, tag_count = tags.len(), ttl_seconds = ttl.as_secs(), "cache set with tags");
            },
            Err(err) => error!(key, %err, "cache SET with tags failed"),
        }
    }

    /// Invalidate every cache entry bearing any of `tags`.
    ///
    /// For each tag: read the keys bearing it; for each key, read its side-set
    /// of tags, remove the key from each of those tag sets, delete the
    /// side-set, delete the key; finally delete the tag set. Idempotent, and
    /// convergent after an interrupted earlier run — a second pass over the
    /// same tag always reaches a fully-clean index.
    pub async fn invalidate_tags(&self, tags: &[String]) {
        let tags: HashSet<&String> = tags.iter().filter(|t| !t.is_empty()).collect();
        if tags.is_empty() {
            return;
        }

        let mut commands = Vec::new();
        let mut invalidated: HashSet<String> = HashSet::new();

        for tag in &tags {
            let tagset_key = self.tag_key(tag);
            let keys = match self.backend.smembers(&tagset_key).await {
                Ok(keys) => keys,
                Err(err) => {
                    error!(tag = tag.as_str(), %err, "cache invalidation failed reading tag set");
                    continue;
                },
            };

            for key in keys {
                let keytags_key = self.keytags_key(&key);
                let key_tags = match self.backend.smembers(&keytags_key).await {
                    Ok(key_tags) => key_tags,
                    Err(err) => {
                        error!(key, %err, "cache invalidation failed reading key tags");
                        Vec::new()
                    },
                };

                for key_tag in key_tags {
                    commands.push(Command::SRem {
                        key:     self.tag_key(&key_tag),
                        members: vec![key.clone()],
                    });
                }
                commands.push(Command::Del {
                    keys: vec![keytags_key, key.clone()],
                });
                invalidated.insert(key);
            }

            commands.push(Command::Del {
                keys: vec![tagset_key],
            });
        }

        match self.backend.pipeline(commands).await {
            Ok(()) => {
                self.counters
                    .invalidations
                    .fetch_add(invalidated.len() as u64, std::sync::atomic::Ordering::Relaxed);
                info!(tag_count = tags.len(), keys_deleted = invalidated.len(), "cache invalidate");
            },
            Err(err) => error!(%err, "cache invalidation pipeline failed"),
        }
    }

    /// All keys currently bearing `tag`. Debugging and tests.
    pub async fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        match self.backend.smembers(&self.tag_key(tag)).await {
            Ok(keys) => keys.into_iter().collect(),
            Err(err) => {
                error!(tag, %err, "failed reading keys for tag");
                HashSet::new()
            },
        }
    }

    // ========================================================================
    // Generational caching
    // ========================================================================

    /// Current version of `tag` (0 when never bumped).
    pub async fn tag_version(&self, tag: &str) -> u64 {
        match self.backend.get(&self.version_key(tag)).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                error!(tag, %err, "failed reading tag version");
                0
            },
        }
    }

    /// Bump the version of `tag`, returning the new version.
    ///
    /// Keys composed with the old version become unreachable without touching
    /// them individually — the economical invalidation path for projections
    /// whose tag fanout is too wide for [`Cache::invalidate_tags`].
    pub async fn bump_tag(&self, tag: &str) -> u64 {
        match self.backend.incr(&self.version_key(tag)).await {
            Ok(version) => {
                info!(tag, version, "cache tag bumped");
                u64::try_from(version).unwrap_or(0)
            },
            Err(err) => {
                error!(tag, %err, "failed bumping tag version");
                0
            },
        }
    }

    /// Compose a self-invalidating key from `base` and the current versions of
    /// `tags`: after any `bump_tag(t)` no future call yields the same key.
    pub async fn compose_versioned_key(&self, base: &str, tags: &[String]) -> String {
        let mut versions = Vec::with_capacity(tags.len());
        for tag in tags {
            versions.push(format!("{tag}@{}", self.tag_version(tag).await));
        }
        let composite = serde_json::json!({"base": base, "v": versions});
        let hashed = keys::stable_key(&composite);
        self.k(&["v", &hashed])
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    /// Delete every key under this cache's prefix. Tests and development only.
    pub async fn clear_prefix(&self) {
        let pattern = format!("{}:*", self.prefix);
        match self.backend.scan_match(&pattern).await {
            Ok(keys) => {
                if !keys.is_empty() {
                    if let Err(err) = self.backend.del(&keys).await {
                        error!(%err, "cache clear failed deleting keys");
                        return;
                    }
                }
                warn!(prefix = self.prefix.as_str(), "cache cleared");
            },
            Err(err) => error!(%err, "cache clear failed scanning keys"),
        }
    }

    /// Snapshot of hit/miss/set/invalidation counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Reset all counters to zero.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("prefix", &self.prefix)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cache() -> Cache {
        Cache::in_memory("test")
    }

    #[tokio::test]
    async fn test_key_building() {
        let cache = cache();
        assert_eq!(cache.entity_key("course", "c1"), "test:course:c1");
        assert_eq!(cache.k(&["tag", "course:c1"]), "test:tag:course:c1");
    }

    #[tokio::test]
    async fn test_composite_key_is_stable() {
        let cache = cache();
        let a = cache.composite_key("query", &json!({"a": 1, "b": 2}));
        let b = cache.composite_key("query", &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
        assert!(a.starts_with("test:query:"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache();
        cache.set_by_key("test:x", &json!({"v": 1}), None).await;
        let got: Option<serde_json::Value> = cache.get_by_key("test:x").await;
        assert_eq!(got, Some(json!({"v": 1})));

        cache.delete_by_key("test:x").await;
        let got: Option<serde_json::Value> = cache.get_by_key("test:x").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_set_with_tags_indexes_both_ways() {
        let cache = cache();
        cache
            .set_with_tags("test:course:c1", &json!({"title": "t"}), ["course:c1", "org:o1"], None)
            .await;

        let keys = cache.keys_for_tag("course:c1").await;
        assert!(keys.contains("test:course:c1"));
        let keys = cache.keys_for_tag("org:o1").await;
        assert!(keys.contains("test:course:c1"));
    }

    #[tokio::test]
    async fn test_invalidate_any_tag_removes_value() {
        let cache = cache();
        cache
            .set_with_tags("test:course:c1", &json!(1), ["course:c1", "org:o1"], None)
            .await;

        cache.invalidate_tags(&["org:o1".to_string()]).await;

        let got: Option<serde_json::Value> = cache.get_by_key("test:course:c1").await;
        assert_eq!(got, None);
        // The other tag's set no longer references the dead key.
        assert!(!cache.keys_for_tag("course:c1").await.contains("test:course:c1"));
    }

    #[tokio::test]
    async fn test_invalidation_is_idempotent() {
        let cache = cache();
        cache.set_with_tags("test:k", &json!(1), ["t1"], None).await;

        cache.invalidate_tags(&["t1".to_string()]).await;
        cache.invalidate_tags(&["t1".to_string()]).await;

        let got: Option<serde_json::Value> = cache.get_by_key("test:k").await;
        assert_eq!(got, None);
        assert!(cache.keys_for_tag("t1").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_tags_fall_back_to_plain_set() {
        let cache = cache();
        cache.set_with_tags("test:k", &json!(1), Vec::<String>::new(), None).await;
        let got: Option<serde_json::Value> = cache.get_by_key("test:k").await;
        assert_eq!(got, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_blank_tags_are_filtered() {
        let cache = cache();
        cache.set_with_tags("test:k", &json!(1), ["", "t1"], None).await;
        assert!(cache.keys_for_tag("").await.is_empty());
        assert!(cache.keys_for_tag("t1").await.contains("test:k"));
    }

    #[tokio::test]
    async fn test_bump_tag_changes_versioned_key() {
        let cache = cache();
        let tags = vec!["org:o1".to_string()];

        let before = cache.compose_versioned_key("dashboard:u1", &tags).await;
        let again = cache.compose_versioned_key("dashboard:u1", &tags).await;
        assert_eq!(before, again);

        let version = cache.bump_tag("org:o1").await;
        assert_eq!(version, 1);

        let after = cache.compose_versioned_key("dashboard:u1", &tags).await;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = cache();
        cache.set_by_key("test:k", &json!(1), None).await;
        let _: Option<serde_json::Value> = cache.get_by_key("test:k").await;
        let _: Option<serde_json::Value> = cache.get_by_key("test:absent").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_clear_prefix_removes_everything() {
        let cache = cache();
        cache.set_with_tags("test:a", &json!(1), ["t"], None).await;
        cache.set_by_key("test:b", &json!(2), None).await;

        cache.clear_prefix().await;

        let a: Option<serde_json::Value> = cache.get_by_key("test:a").await;
        let b: Option<serde_json::Value> = cache.get_by_key("test:b").await;
        assert_eq!(a, None);
        assert_eq!(b, None);
        assert!(cache.keys_for_tag("t").await.is_empty());
    }
}
