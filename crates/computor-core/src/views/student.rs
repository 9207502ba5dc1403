//! Student view repository.

use std::time::Duration;

use computor_cache::RelatedId;
use computor_error::{CoreError, Result};
use tracing::debug;
use uuid::Uuid;

use super::dto::{CourseContentQueryParams, CourseQueryParams, CourseView, StudentCourseContent};
use super::{aggregate_unit_statuses, unit_status_from_rows, ViewContext};
use crate::model::Ltree;
use crate::query::{fetch_content_rows, ContentQuery, Scope};

/// Per-user student projections: course contents with submission, grading,
/// and unread-message state, plus enrolled course listings.
pub struct StudentViewRepository {
    ctx: ViewContext,
}

impl StudentViewRepository {
    /// Students get a 5-minute cache TTL.
    const TTL: Duration = Duration::from_secs(300);

    /// Build the repository over a request's view context.
    #[must_use]
    pub fn new(ctx: ViewContext) -> Self {
        Self { ctx }
    }

    /// The underlying context (pool instrumentation in tests).
    #[must_use]
    pub fn context(&self) -> &ViewContext {
        &self.ctx
    }

    /// Detailed course content for a student.
    pub async fn get_course_content(
        &self,
        user_id: Uuid,
        course_content_id: Uuid,
    ) -> Result<StudentCourseContent> {
        if let Some(cached) = self
            .ctx
            .get_cached_view(user_id, "course_content", Some(&course_content_id.to_string()))
            .await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let mut query = ContentQuery::new(Scope::User(user_id), user_id);
        query.course_content_id = Some(course_content_id);
        let rows = fetch_content_rows(db, &query).await?;
        let Some(row) = rows.first() else {
            return Err(CoreError::not_found("course_content"));
        };
        let mut result = StudentCourseContent::from(row);

        // Units take their status from descendants, which a single-content
        // query never returns; back-fill from the course-scoped row set.
        if row.submission_group_id.is_none() {
            let mut course_query = ContentQuery::new(Scope::User(user_id), user_id);
            course_query.course_id = Some(row.course_id);
            let course_rows = fetch_content_rows(db, &course_query).await?;
            let (status, unreviewed) = unit_status_from_rows(row.path.as_str(), &course_rows);
            result.status = status;
            result.unreviewed_count = unreviewed;
        }

        let related = vec![
            RelatedId::pair("course_content_id", &course_content_id.to_string()),
            RelatedId::bare(format!("course_content:{course_content_id}")),
            RelatedId::pair("student_view", &result.course_id.to_string()),
            RelatedId::pair("course_family_id", &result.course_family_id.to_string()),
        ];
        self.ctx
            .set_cached_view(
                user_id,
                "course_content",
                Some(&course_content_id.to_string()),
                &result,
                Self::TTL,
                &related,
            )
            .await;

        Ok(result)
    }

    /// List course contents for a student, filtered by `params`.
    pub async fn list_course_contents(
        &self,
        user_id: Uuid,
        params: &CourseContentQueryParams,
    ) -> Result<Vec<StudentCourseContent>> {
        if let Some(cached) =
            self.ctx.get_cached_query_view(user_id, "course_contents", params).await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let mut query = ContentQuery::new(Scope::User(user_id), user_id);
        query.course_id = params.course_id;
        query.content_type_id = params.course_content_type_id;
        query.include_archived = params.include_archived.unwrap_or(false);
        if let Some(path) = &params.path {
            query.path_prefix = Some(Ltree::new(path.as_str())?);
        }
        let rows = fetch_content_rows(db, &query).await?;

        let mut contents: Vec<StudentCourseContent> =
            rows.iter().map(StudentCourseContent::from).collect();

        // Units whose descendants were filtered out fall back to one
        // course-scoped query each course, then a local reduction.
        let missing = aggregate_unit_statuses(&mut contents);
        for index in missing {
            let course_id = contents[index].course_id;
            let mut course_query = ContentQuery::new(Scope::User(user_id), user_id);
            course_query.course_id = Some(course_id);
            let course_rows = fetch_content_rows(db, &course_query).await?;
            let (status, unreviewed) =
                unit_status_from_rows(contents[index].path.as_str(), &course_rows);
            contents[index].status = status;
            contents[index].unreviewed_count = unreviewed;
        }

        let mut related = Vec::new();
        if let Some(course_id) = params.course_id {
            related.push(RelatedId::pair("student_view", &course_id.to_string()));
        }
        for content in &contents {
            related.push(RelatedId::bare(format!("course_content:{}", content.id)));
        }
        self.ctx
            .set_cached_query_view(user_id, "course_contents", params, &contents, Self::TTL, related)
            .await;

        debug!(%user_id, count = contents.len(), "student course contents computed");
        Ok(contents)
    }

    /// Detailed course information for a student.
    pub async fn get_course(&self, user_id: Uuid, course_id: Uuid) -> Result<CourseView> {
        if let Some(cached) =
            self.ctx.get_cached_view(user_id, "course", Some(&course_id.to_string())).await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let row = db
            .query_opt(
                "SELECT c.id, c.title, c.course_family_id, c.organization_id, \
                        c.path::text AS path, c.properties \
                 FROM course c \
                 JOIN course_member cm ON cm.course_id = c.id \
                 WHERE c.id = $1 AND cm.user_id = $2",
                &[&course_id, &user_id],
            )
            .await?
            .ok_or_else(|| CoreError::not_found("course"))?;

        let properties: Option<serde_json::Value> = row.try_get("properties")?;
        let course = CourseView {
            id:               row.try_get("id")?,
            title:            row.try_get("title")?,
            course_family_id: row.try_get("course_family_id")?,
            organization_id:  row.try_get("organization_id")?,
            path:             Ltree::new(row.try_get::<_, String>("path")?)?,
            repository:       CourseView::repository_from_properties(properties.as_ref(), false),
        };

        let related = vec![
            RelatedId::pair("course_id", &course_id.to_string()),
            RelatedId::pair("course_family_id", &course.course_family_id.to_string()),
            RelatedId::pair("organization_id", &course.organization_id.to_string()),
        ];
        self.ctx
            .set_cached_view(
                user_id,
                "course",
                Some(&course_id.to_string()),
                &course,
                Self::TTL,
                &related,
            )
            .await;
        Ok(course)
    }

    /// List the courses the student is enrolled in.
    pub async fn list_courses(
        &self,
        user_id: Uuid,
        params: &CourseQueryParams,
    ) -> Result<Vec<CourseView>> {
        if let Some(cached) = self.ctx.get_cached_query_view(user_id, "courses", params).await {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let mut sql = "SELECT c.id, c.title, c.course_family_id, c.organization_id, \
                              c.path::text AS path, c.properties \
                       FROM course c \
                       JOIN course_member cm ON cm.course_id = c.id \
                       WHERE cm.user_id = $1 AND c.archived_at IS NULL"
            .to_string();
        let mut query_params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = vec![&user_id];
        if let Some(family_id) = &params.course_family_id {
            query_params.push(family_id);
            sql.push_str(format!(" AND c.course_family_id = ${}", query_params.len()).as_str());
        }
        if let Some(org_id) = &params.organization_id {
            query_params.push(org_id);
            sql.push_str(format!(" AND c.organization_id = ${}", query_params.len()).as_str());
        }
        sql.push_str(" ORDER BY path");

        let rows = db.query(sql.as_str(), &query_params).await?;
        let courses: Vec<CourseView> = rows
            .iter()
            .map(|row| -> Result<CourseView> {
                let properties: Option<serde_json::Value> = row.try_get("properties")?;
                Ok(CourseView {
                    id:               row.try_get("id")?,
                    title:            row.try_get("title")?,
                    course_family_id: row.try_get("course_family_id")?,
                    organization_id:  row.try_get("organization_id")?,
                    path:             Ltree::new(row.try_get::<_, String>("path")?)?,
                    repository:       CourseView::repository_from_properties(
                        properties.as_ref(),
                        false,
                    ),
                })
            })
            .collect::<Result<_>>()?;

        self.ctx
            .set_cached_query_view(user_id, "courses", params, &courses, Self::TTL, Vec::new())
            .await;
        Ok(courses)
    }
}
