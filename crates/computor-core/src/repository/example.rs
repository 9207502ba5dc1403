//! Example and example-version repositories.
//!
//! Example versions are immutable once created, yet creating one must reach
//! across ownership: any course that deployed the parent example by
//! identifier shows the new version's status, so the write invalidates the
//! `course_content:{id}` tag of every dependent deployment. This is the one
//! cascade that crosses from an immutable-entity write to a mutable
//! downstream projection.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use computor_cache::Cache;
use computor_error::Result;
use tokio_postgres::{Client, Row};
use tracing::info;
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters, WriteOp};
use crate::model::{Example, ExampleVersion, Ltree};

const EXAMPLE_COLUMNS: &str = "id, identifier::text AS identifier, language, is_public";
const VERSION_COLUMNS: &str =
    "id, example_id, version_number, version_tag, storage_path, created_at";

fn example_from_row(row: &Row) -> Result<Example> {
    Ok(Example {
        id:         row.try_get("id")?,
        identifier: Ltree::new(row.try_get::<_, String>("identifier")?)?,
        language:   row.try_get("language")?,
        is_public:  row.try_get("is_public")?,
    })
}

fn version_from_row(row: &Row) -> Result<ExampleVersion> {
    Ok(ExampleVersion {
        id:             row.try_get("id")?,
        example_id:     row.try_get("example_id")?,
        version_number: row.try_get("version_number")?,
        version_tag:    row.try_get("version_tag")?,
        storage_path:   row.try_get("storage_path")?,
        created_at:     row.try_get("created_at")?,
    })
}

/// Patch for [`Example`].
#[derive(Debug, Default)]
pub struct ExamplePatch {
    /// New language.
    pub language:  Option<String>,
    /// New visibility.
    pub is_public: Option<bool>,
}

/// Tag and SQL policy for [`Example`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExamplePolicy;

/// Tags for an example row.
pub(crate) fn example_tags(entity: &Example) -> HashSet<String> {
    let mut tags =
        HashSet::from([format!("example:{}", entity.id), "example:list".to_string()]);
    if let Some(language) = &entity.language {
        tags.insert(format!("example:language:{language}"));
    }
    if let Some(is_public) = entity.is_public {
        tags.insert(format!("example:public:{is_public}"));
    }
    tags
}

#[async_trait]
impl EntityPolicy for ExamplePolicy {
    type Entity = Example;
    type Patch = ExamplePatch;

    fn entity_type(&self) -> &'static str {
        "example"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn entity_id(&self, entity: &Example) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &Example) -> Result<HashSet<String>> {
        Ok(example_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["example:list".to_string()]);
        if let Some(language) = filters.get("language") {
            tags.insert(format!("example:language:{language}"));
        }
        if let Some(is_public) = filters.get("is_public") {
            tags.insert(format!("example:public:{is_public}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<Example>> {
        let row = db
            .query_opt(format!("SELECT {EXAMPLE_COLUMNS} FROM example WHERE id = $1").as_str(), &[&id])
            .await?;
        row.as_ref().map(example_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<Example>> {
        let (clause, params) = filter_clause(filters, &["language", "is_public", "identifier"])?;
        let rows = db
            .query(
                format!("SELECT {EXAMPLE_COLUMNS} FROM example{clause} ORDER BY identifier").as_str(),
                &params,
            )
            .await?;
        rows.iter().map(example_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &Example) -> Result<Example> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO example (id, identifier, language, is_public) \
                     VALUES ($1, $2::ltree, $3, $4) RETURNING {EXAMPLE_COLUMNS}"
                ).as_str(),
                &[&entity.id, &entity.identifier.as_str(), &entity.language, &entity.is_public],
            )
            .await?;
        example_from_row(&row)
    }

    async fn apply_update(&self, db: &Client, id: Uuid, patch: &ExamplePatch) -> Result<Example> {
        let row = db
            .query_one(
                format!(
                    "UPDATE example SET \
                       language = COALESCE($2, language), \
                       is_public = COALESCE($3, is_public) \
                     WHERE id = $1 RETURNING {EXAMPLE_COLUMNS}"
                ).as_str(),
                &[&id, &patch.language, &patch.is_public],
            )
            .await?;
        example_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &Example) -> Result<()> {
        db.execute("DELETE FROM example WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

/// Patch for [`ExampleVersion`].
///
/// Versions are immutable in content; only bookkeeping fields may move.
#[derive(Debug, Default)]
pub struct ExampleVersionPatch {
    /// New tag label.
    pub version_tag:  Option<String>,
    /// New storage location.
    pub storage_path: Option<String>,
}

/// Tag and SQL policy for [`ExampleVersion`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExampleVersionPolicy;

/// Tags for an example-version row.
pub(crate) fn example_version_tags(entity: &ExampleVersion) -> HashSet<String> {
    let mut tags = HashSet::from([
        format!("example_version:{}", entity.id),
        "example_version:list".to_string(),
        format!("example_version:example:{}", entity.example_id),
        format!("example:{}", entity.example_id),
        format!("course_content_deployment:example_version:{}", entity.id),
    ]);
    if let Some(version_tag) = &entity.version_tag {
        tags.insert(format!("example_version:tag:{version_tag}"));
    }
    tags
}

impl ExampleVersionPolicy {
    /// Invalidate every deployment that references the parent example.
    ///
    /// Deployments pin examples by identifier (labeled-tree equality), not by
    /// version id, so the lookup goes version → parent example → deployments
    /// with an equal `example_identifier`, collecting one
    /// `course_content:{id}` tag per dependent content.
    async fn cascade_to_deployments(
        db: &Client,
        cache: &Cache,
        version: &ExampleVersion,
    ) -> Result<()> {
        let rows = db
            .query(
                "SELECT ccd.course_content_id \
                 FROM course_content_deployment ccd \
                 JOIN example e ON ccd.example_identifier = e.identifier \
                 WHERE e.id = $1",
                &[&version.example_id],
            )
            .await?;

        let tags: Vec<String> = rows
            .iter()
            .map(|row| Ok(format!("course_content:{}", row.try_get::<_, Uuid>(0)?)))
            .collect::<Result<_>>()?;

        if !tags.is_empty() {
            cache.invalidate_tags(&tags).await;
            info!(
                version_id = %version.id,
                deployments = tags.len(),
                "invalidated dependent deployment caches after example version write"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl EntityPolicy for ExampleVersionPolicy {
    type Entity = ExampleVersion;
    type Patch = ExampleVersionPatch;

    fn entity_type(&self) -> &'static str {
        "example_version"
    }

    fn ttl(&self) -> Duration {
        // Immutable once created.
        Duration::from_secs(3600)
    }

    fn entity_id(&self, entity: &ExampleVersion) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &ExampleVersion) -> Result<HashSet<String>> {
        Ok(example_version_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["example_version:list".to_string()]);
        if let Some(example_id) = filters.get("example_id") {
            tags.insert(format!("example_version:example:{example_id}"));
            tags.insert(format!("example:{example_id}"));
        }
        if let Some(version_tag) = filters.get("version_tag") {
            tags.insert(format!("example_version:tag:{version_tag}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<ExampleVersion>> {
        let row = db
            .query_opt(
                format!("SELECT {VERSION_COLUMNS} FROM example_version WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<ExampleVersion>> {
        let (clause, params) =
            filter_clause(filters, &["example_id", "version_tag", "version_number"])?;
        let rows = db
            .query(
                format!(
                    "SELECT {VERSION_COLUMNS} FROM example_version{clause} \
                     ORDER BY version_number DESC"
                ).as_str(),
                &params,
            )
            .await?;
        rows.iter().map(version_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &ExampleVersion) -> Result<ExampleVersion> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO example_version \
                     (id, example_id, version_number, version_tag, storage_path, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {VERSION_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.example_id,
                    &entity.version_number,
                    &entity.version_tag,
                    &entity.storage_path,
                    &entity.created_at,
                ],
            )
            .await?;
        version_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &ExampleVersionPatch,
    ) -> Result<ExampleVersion> {
        let row = db
            .query_one(
                format!(
                    "UPDATE example_version SET \
                       version_tag = COALESCE($2, version_tag), \
                       storage_path = COALESCE($3, storage_path) \
                     WHERE id = $1 RETURNING {VERSION_COLUMNS}"
                ).as_str(),
                &[&id, &patch.version_tag, &patch.storage_path],
            )
            .await?;
        version_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &ExampleVersion) -> Result<()> {
        db.execute("DELETE FROM example_version WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }

    async fn after_write(
        &self,
        db: &Client,
        cache: Option<&Cache>,
        entity: &ExampleVersion,
        op: WriteOp,
    ) -> Result<()> {
        if let Some(cache) = cache {
            if matches!(op, WriteOp::Create | WriteOp::Update) {
                Self::cascade_to_deployments(db, cache, entity).await?;
            }
        }
        Ok(())
    }
}

/// Next sequential version number for an example (1 when none exist).
pub async fn next_version_number(db: &Client, example_id: Uuid) -> Result<i32> {
    let row = db
        .query_one(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM example_version \
             WHERE example_id = $1",
            &[&example_id],
        )
        .await?;
    Ok(row.try_get(0)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_version_tags_reach_deployment_namespace() {
        let version = ExampleVersion {
            id:             Uuid::new_v4(),
            example_id:     Uuid::new_v4(),
            version_number: 2,
            version_tag:    Some("v2.0".to_string()),
            storage_path:   None,
            created_at:     Utc::now(),
        };
        let tags = example_version_tags(&version);
        assert!(tags.contains(format!("example:{}", version.example_id).as_str()));
        assert!(
            tags.contains(format!("course_content_deployment:example_version:{}", version.id).as_str())
        );
        assert!(tags.contains("example_version:tag:v2.0"));
    }

    #[test]
    fn test_example_tags_by_language_and_visibility() {
        let example = Example {
            id:         Uuid::new_v4(),
            identifier: Ltree::new("itp.py.hello").expect("valid path"),
            language:   Some("python".to_string()),
            is_public:  Some(true),
        };
        let tags = example_tags(&example);
        assert!(tags.contains("example:language:python"));
        assert!(tags.contains("example:public:true"));
    }
}
