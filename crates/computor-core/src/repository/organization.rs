//! Organization and course-family repositories.
//!
//! Root of the ownership chain: organizations own course families, which own
//! courses. Writes here are rare (admin operations) but fan out widely, so the
//! tag sets lean on the `org:{id}` bucket that descendant caches carry.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::{CourseFamily, Ltree, Organization};

const ORGANIZATION_COLUMNS: &str = "id, path::text AS path, title, created_at";
const COURSE_FAMILY_COLUMNS: &str = "id, organization_id, path::text AS path, title";

fn organization_from_row(row: &Row) -> Result<Organization> {
    Ok(Organization {
        id:         row.try_get("id")?,
        path:       Ltree::new(row.try_get::<_, String>("path")?)?,
        title:      row.try_get("title")?,
        created_at: row.try_get("created_at")?,
    })
}

fn course_family_from_row(row: &Row) -> Result<CourseFamily> {
    Ok(CourseFamily {
        id:              row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        path:            Ltree::new(row.try_get::<_, String>("path")?)?,
        title:           row.try_get("title")?,
    })
}

/// Patch for [`Organization`].
#[derive(Debug, Default)]
pub struct OrganizationPatch {
    /// New title.
    pub title: Option<String>,
}

/// Tag and SQL policy for [`Organization`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationPolicy;

/// Tags for an organization row.
pub(crate) fn organization_tags(entity: &Organization) -> HashSet<String> {
    HashSet::from([
        format!("organization:{}", entity.id),
        "organization:list".to_string(),
        format!("org:{}", entity.id),
    ])
}

#[async_trait]
impl EntityPolicy for OrganizationPolicy {
    type Entity = Organization;
    type Patch = OrganizationPatch;

    fn entity_type(&self) -> &'static str {
        "organization"
    }

    fn ttl(&self) -> Duration {
        // Organizations barely change.
        Duration::from_secs(3600)
    }

    fn entity_id(&self, entity: &Organization) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &Organization) -> Result<HashSet<String>> {
        Ok(organization_tags(entity))
    }

    fn list_tags(&self, _filters: &Filters) -> HashSet<String> {
        HashSet::from(["organization:list".to_string()])
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<Organization>> {
        let row = db
            .query_opt(
                format!("SELECT {ORGANIZATION_COLUMNS} FROM organization WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<Organization>> {
        let (clause, params) = filter_clause(filters, &["path"])?;
        let rows = db
            .query(
                format!("SELECT {ORGANIZATION_COLUMNS} FROM organization{clause} ORDER BY path").as_str(),
                &params,
            )
            .await?;
        rows.iter().map(organization_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &Organization) -> Result<Organization> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO organization (id, path, title, created_at) \
                     VALUES ($1, $2::ltree, $3, $4) RETURNING {ORGANIZATION_COLUMNS}"
                ).as_str(),
                &[&entity.id, &entity.path.as_str(), &entity.title, &entity.created_at],
            )
            .await?;
        organization_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &OrganizationPatch,
    ) -> Result<Organization> {
        let row = db
            .query_one(
                format!(
                    "UPDATE organization SET title = COALESCE($2, title) \
                     WHERE id = $1 RETURNING {ORGANIZATION_COLUMNS}"
                ).as_str(),
                &[&id, &patch.title],
            )
            .await?;
        organization_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &Organization) -> Result<()> {
        db.execute("DELETE FROM organization WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

/// Patch for [`CourseFamily`].
#[derive(Debug, Default)]
pub struct CourseFamilyPatch {
    /// New title.
    pub title: Option<String>,
}

/// Tag and SQL policy for [`CourseFamily`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseFamilyPolicy;

/// Tags for a course-family row.
pub(crate) fn course_family_tags(entity: &CourseFamily) -> HashSet<String> {
    HashSet::from([
        format!("course_family:{}", entity.id),
        "course_family:list".to_string(),
        format!("org:{}", entity.organization_id),
        format!("organization:{}", entity.organization_id),
    ])
}

#[async_trait]
impl EntityPolicy for CourseFamilyPolicy {
    type Entity = CourseFamily;
    type Patch = CourseFamilyPatch;

    fn entity_type(&self) -> &'static str {
        "course_family"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn entity_id(&self, entity: &CourseFamily) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &CourseFamily) -> Result<HashSet<String>> {
        Ok(course_family_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["course_family:list".to_string()]);
        if let Some(org_id) = filters.get("organization_id") {
            tags.insert(format!("org:{org_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<CourseFamily>> {
        let row = db
            .query_opt(
                format!("SELECT {COURSE_FAMILY_COLUMNS} FROM course_family WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(course_family_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<CourseFamily>> {
        let (clause, params) = filter_clause(filters, &["organization_id", "path"])?;
        let rows = db
            .query(
                format!(
                    "SELECT {COURSE_FAMILY_COLUMNS} FROM course_family{clause} ORDER BY path"
                ).as_str(),
                &params,
            )
            .await?;
        rows.iter().map(course_family_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &CourseFamily) -> Result<CourseFamily> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO course_family (id, organization_id, path, title) \
                     VALUES ($1, $2, $3::ltree, $4) RETURNING {COURSE_FAMILY_COLUMNS}"
                ).as_str(),
                &[&entity.id, &entity.organization_id, &entity.path.as_str(), &entity.title],
            )
            .await?;
        course_family_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &CourseFamilyPatch,
    ) -> Result<CourseFamily> {
        let row = db
            .query_one(
                format!(
                    "UPDATE course_family SET title = COALESCE($2, title) \
                     WHERE id = $1 RETURNING {COURSE_FAMILY_COLUMNS}"
                ).as_str(),
                &[&id, &patch.title],
            )
            .await?;
        course_family_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &CourseFamily) -> Result<()> {
        db.execute("DELETE FROM course_family WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_organization_tags_cover_both_namespaces() {
        let org = Organization {
            id:         Uuid::nil(),
            path:       Ltree::new("kit").expect("valid path"),
            title:      None,
            created_at: Utc::now(),
        };
        let tags = organization_tags(&org);
        assert!(tags.contains(format!("organization:{}", Uuid::nil()).as_str()));
        assert!(tags.contains(format!("org:{}", Uuid::nil()).as_str()));
        assert!(tags.contains("organization:list"));
    }

    #[test]
    fn test_course_family_tags_include_owner() {
        let org_id = Uuid::new_v4();
        let family = CourseFamily {
            id:              Uuid::new_v4(),
            organization_id: org_id,
            path:            Ltree::new("kit.prog").expect("valid path"),
            title:           None,
        };
        let tags = course_family_tags(&family);
        assert!(tags.contains(format!("org:{org_id}").as_str()));
        assert!(tags.contains(format!("course_family:{}", family.id).as_str()));
    }
}
