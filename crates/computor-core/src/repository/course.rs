//! Course repository.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::{Course, Ltree};

const COURSE_COLUMNS: &str = "id, course_family_id, organization_id, title, path::text AS path, \
                              archived_at, properties";

fn course_from_row(row: &Row) -> Result<Course> {
    Ok(Course {
        id:               row.try_get("id")?,
        course_family_id: row.try_get("course_family_id")?,
        organization_id:  row.try_get("organization_id")?,
        title:            row.try_get("title")?,
        path:             Ltree::new(row.try_get::<_, String>("path")?)?,
        archived_at:      row.try_get("archived_at")?,
        properties:       row.try_get("properties")?,
    })
}

/// Patch for [`Course`]. Archiving is an update setting `archived_at`.
#[derive(Debug, Default)]
pub struct CoursePatch {
    /// New title.
    pub title:       Option<String>,
    /// Set or clear the archive marker.
    pub archived_at: Option<Option<DateTime<Utc>>>,
    /// Replace provider properties.
    pub properties:  Option<serde_json::Value>,
}

/// Tag and SQL policy for [`Course`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CoursePolicy;

/// Tags for a course row.
pub(crate) fn course_tags(entity: &Course) -> HashSet<String> {
    HashSet::from([
        format!("course:{}", entity.id),
        "course:list".to_string(),
        format!("course:family:{}", entity.course_family_id),
        format!("course_family:{}", entity.course_family_id),
        format!("org:{}", entity.organization_id),
    ])
}

#[async_trait]
impl EntityPolicy for CoursePolicy {
    type Entity = Course;
    type Patch = CoursePatch;

    fn entity_type(&self) -> &'static str {
        "course"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(600)
    }

    fn entity_id(&self, entity: &Course) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &Course) -> Result<HashSet<String>> {
        Ok(course_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["course:list".to_string()]);
        if let Some(family_id) = filters.get("course_family_id") {
            tags.insert(format!("course:family:{family_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<Course>> {
        let row = db
            .query_opt(format!("SELECT {COURSE_COLUMNS} FROM course WHERE id = $1").as_str(), &[&id])
            .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<Course>> {
        let (clause, params) =
            filter_clause(filters, &["course_family_id", "organization_id", "path"])?;
        let rows = db
            .query(format!("SELECT {COURSE_COLUMNS} FROM course{clause} ORDER BY path").as_str(), &params)
            .await?;
        rows.iter().map(course_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &Course) -> Result<Course> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO course \
                     (id, course_family_id, organization_id, title, path, archived_at, properties) \
                     VALUES ($1, $2, $3, $4, $5::ltree, $6, $7) RETURNING {COURSE_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.course_family_id,
                    &entity.organization_id,
                    &entity.title,
                    &entity.path.as_str(),
                    &entity.archived_at,
                    &entity.properties,
                ],
            )
            .await?;
        course_from_row(&row)
    }

    async fn apply_update(&self, db: &Client, id: Uuid, patch: &CoursePatch) -> Result<Course> {
        let row = db
            .query_one(
                format!(
                    "UPDATE course SET \
                       title = COALESCE($2, title), \
                       archived_at = CASE WHEN $3 THEN $4 ELSE archived_at END, \
                       properties = COALESCE($5, properties) \
                     WHERE id = $1 RETURNING {COURSE_COLUMNS}"
                ).as_str(),
                &[
                    &id,
                    &patch.title,
                    &patch.archived_at.is_some(),
                    &patch.archived_at.clone().flatten(),
                    &patch.properties,
                ],
            )
            .await?;
        course_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &Course) -> Result<()> {
        db.execute("DELETE FROM course WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_tags_cover_family_and_org() {
        let course = Course {
            id:               Uuid::new_v4(),
            course_family_id: Uuid::new_v4(),
            organization_id:  Uuid::new_v4(),
            title:            Some("Prog 1".to_string()),
            path:             Ltree::new("kit.prog.prog1").expect("valid path"),
            archived_at:      None,
            properties:       None,
        };
        let tags = course_tags(&course);
        assert!(tags.contains(format!("course:{}", course.id).as_str()));
        assert!(tags.contains("course:list"));
        assert!(tags.contains(format!("course:family:{}", course.course_family_id).as_str()));
        assert!(tags.contains(format!("course_family:{}", course.course_family_id).as_str()));
        assert!(tags.contains(format!("org:{}", course.organization_id).as_str()));
    }

    #[test]
    fn test_list_tags_pin_family_filter() {
        let filters = Filters::new().with("course_family_id", "cf1");
        let tags = CoursePolicy.list_tags(&filters);
        assert!(tags.contains("course:family:cf1"));
        assert!(tags.contains("course:list"));
    }
}
