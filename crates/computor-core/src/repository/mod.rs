//! Entity repositories: CRUD with transparent caching and tag invalidation.
//!
//! Each persistent entity kind gets one concrete repository built from two
//! parts: the generic [`EntityRepository`], which owns the read-through /
//! write-through / invalidate flow, and an [`EntityPolicy`] implementation,
//! which owns the entity's SQL and — critically — its tag sets.
//!
//! # The tag contract
//!
//! `entity_tags` MUST return a superset of every tag under which any cache
//! store referencing the entity could have been made (the monotone-tag-
//! superset invariant). Updates invalidate the union of the old and new tag
//! sets, so a row moving between parents purges projections on both sides.

mod api_token;
mod course;
mod course_content;
mod deployment;
mod example;
mod member;
mod message;
mod organization;
mod submission;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use computor_cache::Cache;
use computor_error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;
use tracing::debug;
use uuid::Uuid;

pub use api_token::{ApiTokenPatch, ApiTokenPolicy};
pub use course::{CoursePatch, CoursePolicy};
pub use course_content::{CourseContentPatch, CourseContentPolicy};
pub use deployment::{CourseContentDeploymentPatch, CourseContentDeploymentPolicy};
pub use example::{
    next_version_number, ExamplePatch, ExamplePolicy, ExampleVersionPatch, ExampleVersionPolicy,
};
pub use member::{CourseMemberPatch, CourseMemberPolicy, NoopPermissionCache, PermissionCache};
pub use message::{MessagePatch, MessagePolicy};
pub use organization::{
    CourseFamilyPatch, CourseFamilyPolicy, OrganizationPatch, OrganizationPolicy,
};
pub use submission::{
    average_grade_for_artifact, find_latest_artifact_by_group, find_latest_grade_by_artifact,
    SubmissionArtifactPolicy, SubmissionGradePatch, SubmissionGradePolicy, SubmissionGroupPolicy,
};

use crate::db::{acquire, PgPool};

/// Equality filters for list queries, keyed by column name.
///
/// Values are kept textual; the SQL layer compares against the column's text
/// form, so uuid/bool/int filters all bind uniformly. The map is ordered so
/// the derived cache key is stable.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    /// Empty filter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Look up a filter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no filters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which write operation triggered an `after_write` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Row inserted.
    Create,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// Per-entity capability set: tags, TTL, and SQL.
///
/// Implemented as an interface with one concrete record per entity kind, not
/// as inheritance. The generic repository is polymorphic over exactly this
/// surface.
#[async_trait]
pub trait EntityPolicy: Send + Sync {
    /// The entity record type.
    type Entity: Serialize + DeserializeOwned + Send + Sync;
    /// The typed patch accepted by `apply_update`.
    type Patch: Send + Sync;

    /// Stable identifier used in cache keys and tags.
    fn entity_type(&self) -> &'static str;

    /// TTL for cached reads of this entity.
    fn ttl(&self) -> Duration;

    /// The entity's row id.
    fn entity_id(&self, entity: &Self::Entity) -> Uuid;

    /// Tags covering every cache store that could reference this entity.
    ///
    /// May query the store to resolve cross-entity fan-out (e.g. a grade's
    /// artifact → group → members); writers resolve that once, at write time.
    async fn entity_tags(&self, db: &Client, entity: &Self::Entity) -> Result<HashSet<String>>;

    /// Tags covering list queries matching `filters`.
    fn list_tags(&self, filters: &Filters) -> HashSet<String>;

    /// Fetch one row by id.
    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<Self::Entity>>;

    /// Fetch rows matching equality filters.
    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<Self::Entity>>;

    /// Insert and return the refreshed row.
    async fn insert(&self, db: &Client, entity: &Self::Entity) -> Result<Self::Entity>;

    /// Apply a patch and return the refreshed row.
    async fn apply_update(&self, db: &Client, id: Uuid, patch: &Self::Patch)
        -> Result<Self::Entity>;

    /// Delete the row.
    async fn remove(&self, db: &Client, entity: &Self::Entity) -> Result<()>;

    /// Cascade hook, run after the store write and the tag invalidation.
    ///
    /// Default is a no-op; policies with cross-entity cascades (example
    /// versions, course members) override it.
    async fn after_write(
        &self,
        db: &Client,
        cache: Option<&Cache>,
        entity: &Self::Entity,
        op: WriteOp,
    ) -> Result<()> {
        let _ = (db, cache, entity, op);
        Ok(())
    }
}

/// Generic CRUD façade with transparent caching.
///
/// Read order: cache → store. Write order: store → refresh → cache →
/// invalidate → cascade hook. The cache layer never acknowledges a write
/// before the store does, and a disabled cache (`None`) leaves every
/// operation correct — just slower.
pub struct EntityRepository<P: EntityPolicy> {
    pool:   PgPool,
    cache:  Option<Arc<Cache>>,
    policy: P,
}

impl<P: EntityPolicy> EntityRepository<P> {
    /// Build a repository over the shared pool and (optional) cache handle.
    pub fn new(pool: PgPool, cache: Option<Arc<Cache>>, policy: P) -> Self {
        Self { pool, cache, policy }
    }

    /// The repository's policy (tag sets are also exercised directly in tests).
    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn entity_key(&self, cache: &Cache, id: Uuid) -> String {
        cache.entity_key(self.policy.entity_type(), &id.to_string())
    }

    /// Get one entity by id, cache-first.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<P::Entity>> {
        if let Some(cache) = &self.cache {
            let key = self.entity_key(cache, id);
            if let Some(entity) = cache.get_by_key::<P::Entity>(&key).await {
                return Ok(Some(entity));
            }
        }

        let client = acquire(&self.pool).await?;
        let Some(entity) = self.policy.fetch_by_id(&client, id).await? else {
            return Ok(None);
        };

        if let Some(cache) = &self.cache {
            let key = self.entity_key(cache, id);
            let tags = self.policy.entity_tags(&client, &entity).await?;
            cache.set_with_tags(&key, &entity, tags, Some(self.policy.ttl())).await;
        }
        Ok(Some(entity))
    }

    /// List entities matching equality filters, cache-first.
    pub async fn find_by(&self, filters: &Filters) -> Result<Vec<P::Entity>> {
        if let Some(cache) = &self.cache {
            let key = cache.composite_key(self.policy.entity_type(), filters);
            if let Some(entities) = cache.get_by_key::<Vec<P::Entity>>(&key).await {
                return Ok(entities);
            }
        }

        let client = acquire(&self.pool).await?;
        let entities = self.policy.fetch_filtered(&client, filters).await?;

        if let Some(cache) = &self.cache {
            let key = cache.composite_key(self.policy.entity_type(), filters);
            let tags = self.policy.list_tags(filters);
            cache.set_with_tags(&key, &entities, tags, Some(self.policy.ttl())).await;
        }
        Ok(entities)
    }

    /// Create an entity: store → refresh → cache → invalidate → cascade.
    pub async fn create(&self, entity: P::Entity) -> Result<P::Entity> {
        let client = acquire(&self.pool).await?;
        let created = self.policy.insert(&client, &entity).await?;

        if let Some(cache) = &self.cache {
            let key = self.entity_key(cache, self.policy.entity_id(&created));
            // Plain set: the fresh entry must survive the invalidation below,
            // which exists to kill list caches and stale tagged stores. Every
            // later repository write overwrites this same key.
            cache.set_by_key(&key, &created, Some(self.policy.ttl())).await;

            let tags: Vec<String> =
                self.policy.entity_tags(&client, &created).await?.into_iter().collect();
            cache.invalidate_tags(&tags).await;
        }

        self.policy
            .after_write(&client, self.cache.as_deref(), &created, WriteOp::Create)
            .await?;
        debug!(entity_type = self.policy.entity_type(), "entity created");
        Ok(created)
    }

    /// Update an entity: invalidates the union of old and new tag sets.
    pub async fn update(&self, id: Uuid, patch: P::Patch) -> Result<P::Entity> {
        let client = acquire(&self.pool).await?;
        let Some(old) = self.policy.fetch_by_id(&client, id).await? else {
            return Err(CoreError::not_found(self.policy.entity_type()));
        };

        let updated = self.policy.apply_update(&client, id, &patch).await?;

        if let Some(cache) = &self.cache {
            let key = self.entity_key(cache, id);
            cache.set_by_key(&key, &updated, Some(self.policy.ttl())).await;

            let mut tags = self.policy.entity_tags(&client, &old).await?;
            tags.extend(self.policy.entity_tags(&client, &updated).await?);
            let tags: Vec<String> = tags.into_iter().collect();
            cache.invalidate_tags(&tags).await;
        }

        self.policy
            .after_write(&client, self.cache.as_deref(), &updated, WriteOp::Update)
            .await?;
        debug!(entity_type = self.policy.entity_type(), "entity updated");
        Ok(updated)
    }

    /// Delete an entity and purge everything tagged with it.
    pub async fn delete(&self, entity: P::Entity) -> Result<()> {
        let client = acquire(&self.pool).await?;
        self.policy.remove(&client, &entity).await?;

        if let Some(cache) = &self.cache {
            let key = self.entity_key(cache, self.policy.entity_id(&entity));
            cache.delete_by_key(&key).await;

            let tags: Vec<String> =
                self.policy.entity_tags(&client, &entity).await?.into_iter().collect();
            cache.invalidate_tags(&tags).await;
        }

        self.policy
            .after_write(&client, self.cache.as_deref(), &entity, WriteOp::Delete)
            .await?;
        debug!(entity_type = self.policy.entity_type(), "entity deleted");
        Ok(())
    }
}

/// Build a WHERE clause from equality filters against a column whitelist.
///
/// Comparisons run on the column's text form so every scalar type binds the
/// same way; filter keys not in `allowed` are a validation error (they would
/// otherwise be interpolated into SQL).
pub(crate) fn filter_clause<'a>(
    filters: &'a Filters,
    allowed: &[&str],
) -> Result<(String, Vec<&'a (dyn ToSql + Sync)>)> {
    let mut conditions = Vec::new();
    let mut params: Vec<&'a (dyn ToSql + Sync)> = Vec::new();

    for (key, value) in &filters.0 {
        if !allowed.contains(&key.as_str()) {
            return Err(CoreError::validation(format!("unsupported filter column: {key}")));
        }
        params.push(value);
        conditions.push(format!("{key}::text = ${}", params.len()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok((clause, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_are_ordered_and_stable() {
        let a = Filters::new().with("b", 2).with("a", 1);
        let b = Filters::new().with("a", 1).with("b", 2);
        assert_eq!(
            serde_json::to_string(&a).expect("serialize"),
            serde_json::to_string(&b).expect("serialize"),
        );
    }

    #[test]
    fn test_filter_clause_whitelists_columns() {
        let filters = Filters::new().with("course_id", "c1");
        assert!(filter_clause(&filters, &["course_id"]).is_ok());

        let hostile = Filters::new().with("id = id; DROP TABLE course; --", "x");
        assert!(filter_clause(&hostile, &["course_id"]).is_err());
    }

    #[test]
    fn test_filter_clause_numbers_params() {
        let filters = Filters::new().with("course_id", "c1").with("user_id", "u1");
        let (clause, params) = filter_clause(&filters, &["course_id", "user_id"]).expect("clause");
        assert_eq!(clause, " WHERE course_id::text = $1 AND user_id::text = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_empty_filters_produce_no_clause() {
        let filters = Filters::new();
        let (clause, params) = filter_clause(&filters, &["course_id"]).expect("clause");
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }
}
