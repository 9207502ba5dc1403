//! Course member repository.
//!
//! Memberships are the foundation of every permission check, so writes here
//! additionally reach into the external permission cache. That collaborator
//! is opaque to this crate: one entry point, failures logged and never fatal
//! to the membership write itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use computor_cache::Cache;
use computor_error::Result;
use tokio_postgres::{Client, Row};
use tracing::warn;
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters, WriteOp};
use crate::model::CourseMember;

const MEMBER_COLUMNS: &str = "id, course_id, user_id, course_role_id";

fn member_from_row(row: &Row) -> Result<CourseMember> {
    Ok(CourseMember {
        id:             row.try_get("id")?,
        course_id:      row.try_get("course_id")?,
        user_id:        row.try_get("user_id")?,
        course_role_id: row.try_get("course_role_id")?,
    })
}

/// External permission-cache collaborator.
///
/// Details of permission caching live outside this crate; membership writes
/// only need the single invalidation entry point.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Drop every cached permission derived from the user's memberships.
    async fn invalidate_user_course_memberships(&self, user_id: Uuid) -> Result<()>;
}

/// Permission cache that does nothing; for deployments without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPermissionCache;

#[async_trait]
impl PermissionCache for NoopPermissionCache {
    async fn invalidate_user_course_memberships(&self, _user_id: Uuid) -> Result<()> {
        Ok(())
    }
}

/// Patch for [`CourseMember`].
#[derive(Debug, Default)]
pub struct CourseMemberPatch {
    /// New role.
    pub course_role_id: Option<String>,
}

/// Tag and SQL policy for [`CourseMember`].
pub struct CourseMemberPolicy {
    permissions: Arc<dyn PermissionCache>,
}

impl CourseMemberPolicy {
    /// Build the policy around the external permission cache.
    #[must_use]
    pub fn new(permissions: Arc<dyn PermissionCache>) -> Self {
        Self { permissions }
    }
}

impl Default for CourseMemberPolicy {
    fn default() -> Self {
        Self::new(Arc::new(NoopPermissionCache))
    }
}

/// Tags for a membership row.
pub(crate) fn course_member_tags(entity: &CourseMember) -> HashSet<String> {
    HashSet::from([
        format!("course_member:{}", entity.id),
        "course_member:list".to_string(),
        format!("course_member:course:{}", entity.course_id),
        format!("course:{}", entity.course_id),
        format!("student_view:{}", entity.course_id),
        format!("tutor_view:{}", entity.course_id),
        format!("lecturer_view:{}", entity.course_id),
        format!("course_member:user:{}", entity.user_id),
        format!("user:{}", entity.user_id),
        format!("course_member:role:{}", entity.course_role_id),
    ])
}

#[async_trait]
impl EntityPolicy for CourseMemberPolicy {
    type Entity = CourseMember;
    type Patch = CourseMemberPatch;

    fn entity_type(&self) -> &'static str {
        "course_member"
    }

    fn ttl(&self) -> Duration {
        // Memberships are relatively stable.
        Duration::from_secs(600)
    }

    fn entity_id(&self, entity: &CourseMember) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &CourseMember) -> Result<HashSet<String>> {
        Ok(course_member_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["course_member:list".to_string()]);
        if let Some(course_id) = filters.get("course_id") {
            tags.insert(format!("course_member:course:{course_id}"));
            tags.insert(format!("course:{course_id}"));
        }
        if let Some(user_id) = filters.get("user_id") {
            tags.insert(format!("course_member:user:{user_id}"));
            tags.insert(format!("user:{user_id}"));
        }
        if let Some(role) = filters.get("course_role_id") {
            tags.insert(format!("course_member:role:{role}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<CourseMember>> {
        let row = db
            .query_opt(
                format!("SELECT {MEMBER_COLUMNS} FROM course_member WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<CourseMember>> {
        let (clause, params) = filter_clause(filters, &["course_id", "user_id", "course_role_id"])?;
        let rows = db
            .query(format!("SELECT {MEMBER_COLUMNS} FROM course_member{clause}").as_str(), &params)
            .await?;
        rows.iter().map(member_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &CourseMember) -> Result<CourseMember> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO course_member (id, course_id, user_id, course_role_id) \
                     VALUES ($1, $2, $3, $4) RETURNING {MEMBER_COLUMNS}"
                ).as_str(),
                &[&entity.id, &entity.course_id, &entity.user_id, &entity.course_role_id],
            )
            .await?;
        member_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &CourseMemberPatch,
    ) -> Result<CourseMember> {
        let row = db
            .query_one(
                format!(
                    "UPDATE course_member SET course_role_id = COALESCE($2, course_role_id) \
                     WHERE id = $1 RETURNING {MEMBER_COLUMNS}"
                ).as_str(),
                &[&id, &patch.course_role_id],
            )
            .await?;
        member_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &CourseMember) -> Result<()> {
        db.execute("DELETE FROM course_member WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }

    async fn after_write(
        &self,
        _db: &Client,
        _cache: Option<&Cache>,
        entity: &CourseMember,
        _op: WriteOp,
    ) -> Result<()> {
        // Permission staleness must not outlive a membership change, but a
        // failing permission backend must not fail the write either.
        if let Err(err) =
            self.permissions.invalidate_user_course_memberships(entity.user_id).await
        {
            warn!(user_id = %entity.user_id, %err, "permission cache invalidation failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> CourseMember {
        CourseMember {
            id:             Uuid::new_v4(),
            course_id:      Uuid::new_v4(),
            user_id:        Uuid::new_v4(),
            course_role_id: "_student".to_string(),
        }
    }

    #[test]
    fn test_member_tags_cover_views_and_user() {
        let entity = member();
        let tags = course_member_tags(&entity);
        assert!(tags.contains(format!("student_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("tutor_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("lecturer_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("user:{}", entity.user_id).as_str()));
        assert!(tags.contains("course_member:role:_student"));
    }

    #[test]
    fn test_role_change_union_covers_both_roles() {
        let mut entity = member();
        let before = course_member_tags(&entity);
        entity.course_role_id = "_tutor".to_string();
        let after = course_member_tags(&entity);

        let union: HashSet<_> = before.union(&after).collect();
        assert!(union.contains(&"course_member:role:_student".to_string()));
        assert!(union.contains(&"course_member:role:_tutor".to_string()));
    }

    #[tokio::test]
    async fn test_noop_permission_cache_accepts_invalidation() {
        let cache = NoopPermissionCache;
        assert!(cache.invalidate_user_course_memberships(Uuid::new_v4()).await.is_ok());
    }
}
