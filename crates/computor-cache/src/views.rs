//! User-view projection storage.
//!
//! Codifies the key/tag scheme for per-user aggregated projections (student,
//! tutor, lecturer, grading views): keys are
//! `{prefix}:user_view:{user_id}:{view_type}[:{view_id}]` and every value is
//! tagged so it can be purged by user, by view type, or by any related entity.

use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::Cache;

/// Default TTL for user-view projections.
const USER_VIEW_TTL: Duration = Duration::from_secs(300);

/// A related-entity tag attached to a cached user view.
///
/// Most call sites pin a projection to the entities it was computed from via
/// `{entity_type}:{entity_id}` pairs; list projections additionally pin each
/// returned row with an already-formed tag such as `course_content:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelatedId(String);

impl RelatedId {
    /// Tag from an entity-type / entity-id pair: `{entity_type}:{id}`.
    #[must_use]
    pub fn pair(entity_type: &str, entity_id: &str) -> Self {
        Self(format!("{entity_type}:{entity_id}"))
    }

    /// Tag used verbatim (per-row pins like `course_content:{id}`).
    #[must_use]
    pub fn bare(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The final tag string.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.0
    }
}

impl Cache {
    fn user_view_key(&self, user_id: &str, view_type: &str, view_id: Option<&str>) -> String {
        match view_id {
            Some(view_id) => self.k(&["user_view", user_id, view_type, view_id]),
            None => self.k(&["user_view", user_id, view_type]),
        }
    }

    /// Get cached user-view data.
    pub async fn get_user_view<T: DeserializeOwned>(
        &self,
        user_id: &str,
        view_type: &str,
        view_id: Option<&str>,
    ) -> Option<T> {
        let key = self.user_view_key(user_id, view_type, view_id);
        self.get_by_key(&key).await
    }

    /// Cache user-view data with the standard invalidation tags.
    ///
    /// Tags: `user:{uid}`, `user:{uid}:{view_type}`, `view:{view_type}`, plus
    /// `user:{uid}:{view_type}:{view_id}` when a view id is given, plus one
    /// tag per related id. Default TTL 300 s.
    pub async fn set_user_view<T: Serialize>(
        &self,
        user_id: &str,
        view_type: &str,
        view_id: Option<&str>,
        data: &T,
        ttl: Option<Duration>,
        related_ids: &[RelatedId],
    ) {
        let key = self.user_view_key(user_id, view_type, view_id);

        let mut tags: HashSet<String> = HashSet::from([
            format!("user:{user_id}"),
            format!("user:{user_id}:{view_type}"),
            format!("view:{view_type}"),
        ]);
        if let Some(view_id) = view_id {
            tags.insert(format!("user:{user_id}:{view_type}:{view_id}"));
        }
        for related in related_ids {
            tags.insert(related.tag().to_string());
        }

        self.set_with_tags(&key, data, tags, Some(ttl.unwrap_or(USER_VIEW_TTL))).await;
    }

    /// Invalidate user views with flexible targeting.
    ///
    /// Tag selection: `user:{uid}:{view_type}` when both are given, otherwise
    /// `user:{uid}`, otherwise `view:{view_type}`; an entity pair additionally
    /// invalidates `{entity_type}:{entity_id}`.
    pub async fn invalidate_user_views(
        &self,
        user_id: Option<&str>,
        view_type: Option<&str>,
        entity: Option<(&str, &str)>,
    ) {
        let mut tags = Vec::new();

        match (user_id, view_type) {
            (Some(uid), Some(vt)) => tags.push(format!("user:{uid}:{vt}")),
            (Some(uid), None) => tags.push(format!("user:{uid}")),
            (None, Some(vt)) => tags.push(format!("view:{vt}")),
            (None, None) => {},
        }
        if let Some((entity_type, entity_id)) = entity {
            tags.push(format!("{entity_type}:{entity_id}"));
        }

        if !tags.is_empty() {
            self.invalidate_tags(&tags).await;
            debug!(?user_id, ?view_type, ?entity, "invalidated user views");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn cache() -> Cache {
        Cache::in_memory("test")
    }

    #[tokio::test]
    async fn test_user_view_roundtrip() {
        let cache = cache();
        cache.set_user_view("u1", "courses", None, &json!([1, 2]), None, &[]).await;
        let got: Option<Value> = cache.get_user_view("u1", "courses", None).await;
        assert_eq!(got, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_view_id_distinguishes_entries() {
        let cache = cache();
        cache.set_user_view("u1", "course_content", Some("cc1"), &json!(1), None, &[]).await;
        cache.set_user_view("u1", "course_content", Some("cc2"), &json!(2), None, &[]).await;

        let a: Option<Value> = cache.get_user_view("u1", "course_content", Some("cc1")).await;
        let b: Option<Value> = cache.get_user_view("u1", "course_content", Some("cc2")).await;
        assert_eq!(a, Some(json!(1)));
        assert_eq!(b, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_invalidate_by_user_removes_only_that_user() {
        let cache = cache();
        cache.set_user_view("u1", "courses", None, &json!(1), None, &[]).await;
        cache.set_user_view("u2", "courses", None, &json!(2), None, &[]).await;

        cache.invalidate_user_views(Some("u1"), None, None).await;

        let a: Option<Value> = cache.get_user_view("u1", "courses", None).await;
        let b: Option<Value> = cache.get_user_view("u2", "courses", None).await;
        assert_eq!(a, None);
        assert_eq!(b, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_invalidate_by_view_type_spans_users() {
        let cache = cache();
        cache.set_user_view("u1", "courses", None, &json!(1), None, &[]).await;
        cache.set_user_view("u2", "courses", None, &json!(2), None, &[]).await;
        cache.set_user_view("u1", "course_content", Some("cc1"), &json!(3), None, &[]).await;

        cache.invalidate_user_views(None, Some("courses"), None).await;

        let a: Option<Value> = cache.get_user_view("u1", "courses", None).await;
        let b: Option<Value> = cache.get_user_view("u2", "courses", None).await;
        let c: Option<Value> = cache.get_user_view("u1", "course_content", Some("cc1")).await;
        assert_eq!(a, None);
        assert_eq!(b, None);
        assert_eq!(c, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_related_id_tags_enable_entity_invalidation() {
        let cache = cache();
        cache
            .set_user_view(
                "u1",
                "course_contents",
                None,
                &json!([1]),
                None,
                &[RelatedId::pair("student_view", "c1"), RelatedId::bare("course_content:cc1")],
            )
            .await;

        cache.invalidate_tags(&["course_content:cc1".to_string()]).await;

        let got: Option<Value> = cache.get_user_view("u1", "course_contents", None).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_user_and_view_type_selector_is_narrow() {
        let cache = cache();
        cache.set_user_view("u1", "courses", None, &json!(1), None, &[]).await;
        cache.set_user_view("u1", "course_contents", None, &json!(2), None, &[]).await;

        cache.invalidate_user_views(Some("u1"), Some("courses"), None).await;

        let a: Option<Value> = cache.get_user_view("u1", "courses", None).await;
        let b: Option<Value> = cache.get_user_view("u1", "course_contents", None).await;
        assert_eq!(a, None);
        assert_eq!(b, Some(json!(2)));
    }
}
