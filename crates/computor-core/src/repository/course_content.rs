//! Course content repository.
//!
//! Content rows feed every per-course projection, so their tag set includes
//! the three view buckets: mutating a content invalidates the student, tutor,
//! and lecturer views of its course in one pass.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::{CourseContent, Ltree};

const CONTENT_COLUMNS: &str = "id, course_id, path::text AS path, title, \
                               course_content_type_id, course_content_kind_id, position, \
                               max_test_runs, max_submissions, archived_at";

fn content_from_row(row: &Row) -> Result<CourseContent> {
    Ok(CourseContent {
        id:                     row.try_get("id")?,
        course_id:              row.try_get("course_id")?,
        path:                   Ltree::new(row.try_get::<_, String>("path")?)?,
        title:                  row.try_get("title")?,
        course_content_type_id: row.try_get("course_content_type_id")?,
        course_content_kind_id: row.try_get("course_content_kind_id")?,
        position:               row.try_get("position")?,
        max_test_runs:          row.try_get("max_test_runs")?,
        max_submissions:        row.try_get("max_submissions")?,
        archived_at:            row.try_get("archived_at")?,
    })
}

/// Patch for [`CourseContent`]. Soft deletion sets `archived_at`.
#[derive(Debug, Default)]
pub struct CourseContentPatch {
    /// New title.
    pub title:           Option<String>,
    /// New sibling position.
    pub position:        Option<f64>,
    /// Set or clear the archive marker.
    pub archived_at:     Option<Option<DateTime<Utc>>>,
    /// New test-run limit.
    pub max_test_runs:   Option<i32>,
    /// New submission limit.
    pub max_submissions: Option<i32>,
}

/// Tag and SQL policy for [`CourseContent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseContentPolicy;

/// Tags for a content row.
pub(crate) fn course_content_tags(entity: &CourseContent) -> HashSet<String> {
    HashSet::from([
        format!("course_content:{}", entity.id),
        "course_content:list".to_string(),
        format!("course_content:course:{}", entity.course_id),
        format!("course:{}", entity.course_id),
        format!("student_view:{}", entity.course_id),
        format!("tutor_view:{}", entity.course_id),
        format!("lecturer_view:{}", entity.course_id),
    ])
}

#[async_trait]
impl EntityPolicy for CourseContentPolicy {
    type Entity = CourseContent;
    type Patch = CourseContentPatch;

    fn entity_type(&self) -> &'static str {
        "course_content"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(600)
    }

    fn entity_id(&self, entity: &CourseContent) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &CourseContent) -> Result<HashSet<String>> {
        Ok(course_content_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["course_content:list".to_string()]);
        if let Some(course_id) = filters.get("course_id") {
            tags.insert(format!("course_content:course:{course_id}"));
            tags.insert(format!("course:{course_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<CourseContent>> {
        let row = db
            .query_opt(
                format!("SELECT {CONTENT_COLUMNS} FROM course_content WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<CourseContent>> {
        let (clause, params) = filter_clause(
            filters,
            &["course_id", "course_content_type_id", "course_content_kind_id", "path"],
        )?;
        let rows = db
            .query(
                format!(
                    "SELECT {CONTENT_COLUMNS} FROM course_content{clause} ORDER BY position, path"
                ).as_str(),
                &params,
            )
            .await?;
        rows.iter().map(content_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &CourseContent) -> Result<CourseContent> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO course_content \
                     (id, course_id, path, title, course_content_type_id, \
                      course_content_kind_id, position, max_test_runs, max_submissions, \
                      archived_at) \
                     VALUES ($1, $2, $3::ltree, $4, $5, $6, $7, $8, $9, $10) \
                     RETURNING {CONTENT_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.course_id,
                    &entity.path.as_str(),
                    &entity.title,
                    &entity.course_content_type_id,
                    &entity.course_content_kind_id,
                    &entity.position,
                    &entity.max_test_runs,
                    &entity.max_submissions,
                    &entity.archived_at,
                ],
            )
            .await?;
        content_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &CourseContentPatch,
    ) -> Result<CourseContent> {
        let row = db
            .query_one(
                format!(
                    "UPDATE course_content SET \
                       title = COALESCE($2, title), \
                       position = COALESCE($3, position), \
                       archived_at = CASE WHEN $4 THEN $5 ELSE archived_at END, \
                       max_test_runs = COALESCE($6, max_test_runs), \
                       max_submissions = COALESCE($7, max_submissions) \
                     WHERE id = $1 RETURNING {CONTENT_COLUMNS}"
                ).as_str(),
                &[
                    &id,
                    &patch.title,
                    &patch.position,
                    &patch.archived_at.is_some(),
                    &patch.archived_at.clone().flatten(),
                    &patch.max_test_runs,
                    &patch.max_submissions,
                ],
            )
            .await?;
        content_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &CourseContent) -> Result<()> {
        db.execute("DELETE FROM course_content WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> CourseContent {
        CourseContent {
            id:                     Uuid::new_v4(),
            course_id:              Uuid::new_v4(),
            path:                   Ltree::new("w1.a").expect("valid path"),
            title:                  None,
            course_content_type_id: Uuid::new_v4(),
            course_content_kind_id: "assignment".to_string(),
            position:               1.0,
            max_test_runs:          None,
            max_submissions:        None,
            archived_at:            None,
        }
    }

    #[test]
    fn test_content_tags_hit_all_three_view_buckets() {
        let entity = content();
        let tags = course_content_tags(&entity);
        assert!(tags.contains(format!("student_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("tutor_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("lecturer_view:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("course_content:{}", entity.id).as_str()));
        assert!(tags.contains(format!("course:{}", entity.course_id).as_str()));
    }

    #[test]
    fn test_tag_superset_across_archive_transition() {
        // Archiving only flips archived_at; the tag set must not shrink, so
        // the union invalidated on update still covers pre-archive stores.
        let before = content();
        let mut after = before.clone();
        after.archived_at = Some(Utc::now());
        assert_eq!(course_content_tags(&before), course_content_tags(&after));
    }
}
