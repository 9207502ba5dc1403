//! Coherency properties of the tag index.
//!
//! These tests exercise the contracts the repository layer relies on:
//! round-trip invalidation for every tag subset, idempotency, self-healing
//! after an interrupted invalidation, and full bypass-mode degradation when
//! the backend errors on every call.

use std::sync::Arc;

use async_trait::async_trait;
use computor_cache::{Cache, CacheBackend, CacheError, Command, MemoryBackend, RelatedId};
use serde_json::{json, Value};

fn cache_over(backend: Arc<dyn CacheBackend>) -> Cache {
    Cache::new(backend, "test", None)
}

#[tokio::test]
async fn roundtrip_holds_for_every_nonempty_tag_subset() {
    let tags = ["course:c1", "student_view:c1", "cm_grading:m1"];

    // Every non-empty subset of the tag set must kill the key.
    for mask in 1u32..(1 << tags.len()) {
        let cache = cache_over(Arc::new(MemoryBackend::new()));
        cache
            .set_with_tags("test:victim", &json!({"grade": 0.6}), tags, None)
            .await;

        let subset: Vec<String> = tags
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, t)| (*t).to_string())
            .collect();
        cache.invalidate_tags(&subset).await;

        let got: Option<Value> = cache.get_by_key("test:victim").await;
        assert_eq!(got, None, "subset {subset:?} failed to invalidate");
    }
}

#[tokio::test]
async fn interrupted_invalidation_converges_on_retry() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = cache_over(backend.clone());

    cache.set_with_tags("test:k1", &json!(1), ["t1", "t2"], None).await;
    cache.set_with_tags("test:k2", &json!(2), ["t1"], None).await;

    // Simulate an invalidation that died after deleting one value but before
    // cleaning the index: the value is gone, the tag sets still reference it.
    backend.del(&["test:k1".to_string()]).await.expect("del");
    assert!(cache.keys_for_tag("t1").await.contains("test:k1"));

    // A later invalidation of the same tag converges the index fully.
    cache.invalidate_tags(&["t1".to_string()]).await;

    assert!(cache.keys_for_tag("t1").await.is_empty());
    assert!(cache.keys_for_tag("t2").await.is_empty());
    let k2: Option<Value> = cache.get_by_key("test:k2").await;
    assert_eq!(k2, None);
}

#[tokio::test]
async fn dead_key_in_tag_set_reads_as_invalidated() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = cache_over(backend.clone());

    cache.set_with_tags("test:k", &json!(1), ["t"], None).await;
    backend.del(&["test:k".to_string()]).await.expect("del");

    // The index still references the key; a reader just sees a miss.
    let got: Option<Value> = cache.get_by_key("test:k").await;
    assert_eq!(got, None);
}

#[tokio::test]
async fn user_view_invalidation_is_scoped_to_the_user() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = cache_over(backend.clone());

    cache.set_user_view("u1", "courses", None, &json!(1), None, &[]).await;
    cache.set_user_view("u1", "course_content", Some("cc1"), &json!(2), None, &[]).await;
    cache.set_user_view("u2", "courses", None, &json!(3), None, &[]).await;
    cache.set_by_key("test:course:c1", &json!(4), None).await;

    cache.invalidate_user_views(Some("u1"), None, None).await;

    // Exactly the u1-prefixed values vanish, everything else survives.
    let u1_courses: Option<Value> = cache.get_user_view("u1", "courses", None).await;
    let u1_content: Option<Value> = cache.get_user_view("u1", "course_content", Some("cc1")).await;
    let u2_courses: Option<Value> = cache.get_user_view("u2", "courses", None).await;
    let entity: Option<Value> = cache.get_by_key("test:course:c1").await;
    assert_eq!(u1_courses, None);
    assert_eq!(u1_content, None);
    assert_eq!(u2_courses, Some(json!(3)));
    assert_eq!(entity, Some(json!(4)));
}

#[tokio::test]
async fn entity_scoped_invalidation_reaches_tagged_views() {
    let cache = cache_over(Arc::new(MemoryBackend::new()));

    cache
        .set_user_view(
            "u1",
            "course_contents",
            None,
            &json!([{"id": "cc1"}]),
            None,
            &[RelatedId::pair("student_view", "c1")],
        )
        .await;

    cache.invalidate_user_views(None, None, Some(("student_view", "c1"))).await;

    let got: Option<Value> = cache.get_user_view("u1", "course_contents", None).await;
    assert_eq!(got, None);
}

// ============================================================================
// Bypass mode
// ============================================================================

/// Backend that fails every call, as if Redis were unreachable.
struct FailingBackend;

fn unavailable() -> CacheError {
    CacheError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(unavailable())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn del(&self, _keys: &[String]) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn sadd(&self, _key: &str, _members: &[String]) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn srem(&self, _key: &str, _members: &[String]) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn smembers(&self, _key: &str) -> Result<Vec<String>, CacheError> {
        Err(unavailable())
    }

    async fn incr(&self, _key: &str) -> Result<i64, CacheError> {
        Err(unavailable())
    }

    async fn scan_match(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Err(unavailable())
    }

    async fn pipeline(&self, _commands: Vec<Command>) -> Result<(), CacheError> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn bypass_mode_never_surfaces_errors() {
    let cache = cache_over(Arc::new(FailingBackend));

    // Every operation degrades silently: reads miss, writes no-op.
    cache.set_by_key("test:k", &json!(1), None).await;
    cache.set_with_tags("test:k", &json!(1), ["t"], None).await;
    let got: Option<Value> = cache.get_by_key("test:k").await;
    assert_eq!(got, None);

    cache.invalidate_tags(&["t".to_string()]).await;
    cache.delete_by_key("test:k").await;
    assert!(cache.keys_for_tag("t").await.is_empty());

    assert_eq!(cache.tag_version("t").await, 0);
    assert_eq!(cache.bump_tag("t").await, 0);
    let _versioned = cache.compose_versioned_key("base", &["t".to_string()]).await;

    cache.set_user_view("u1", "courses", None, &json!(1), None, &[]).await;
    let view: Option<Value> = cache.get_user_view("u1", "courses", None).await;
    assert_eq!(view, None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert!(stats.misses > 0);
}

#[tokio::test]
async fn serialization_failure_is_a_miss_not_an_error() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = cache_over(backend.clone());

    // Poison the stored payload so it no longer parses.
    cache.set_by_key("test:k", &json!({"v": 1}), None).await;
    backend.set_ex("test:k", "{not json", 60).await.expect("set");

    let got: Option<Value> = cache.get_by_key("test:k").await;
    assert_eq!(got, None);
}
