//! Lecturer view repository.
//!
//! Course-administration variant of the member-scoped projections: same
//! composite queries as the tutor view, gated at `_lecturer`, cached under
//! its own bucket so lecturer dashboards invalidate independently.

use std::time::Duration;

use computor_cache::RelatedId;
use computor_error::{CoreError, Result};
use uuid::Uuid;

use super::dto::{CourseContentQueryParams, StudentCourseContent};
use super::{aggregate_unit_statuses, require_course_role, ViewContext};
use crate::model::Ltree;
use crate::query::{fetch_content_rows, ContentQuery, Scope};

/// Lecturer projections over course members.
pub struct LecturerViewRepository {
    ctx: ViewContext,
}

impl LecturerViewRepository {
    /// Lecturers get a 5-minute cache TTL.
    const TTL: Duration = Duration::from_secs(300);

    /// Build the repository over a request's view context.
    #[must_use]
    pub fn new(ctx: ViewContext) -> Self {
        Self { ctx }
    }

    /// The underlying context.
    #[must_use]
    pub fn context(&self) -> &ViewContext {
        &self.ctx
    }

    /// Course content of one member, for course administration.
    pub async fn get_course_content(
        &self,
        course_member_id: Uuid,
        course_content_id: Uuid,
        reader_user_id: Uuid,
    ) -> Result<super::dto::StudentCourseContent> {
        let view_type = format!("lecturer:member:{course_member_id}:content:{course_content_id}");
        if let Some(cached) = self.ctx.get_cached_view(reader_user_id, &view_type, None).await {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let row = db
            .query_opt("SELECT course_id FROM course_member WHERE id = $1", &[&course_member_id])
            .await?
            .ok_or_else(|| CoreError::not_found("course_member"))?;
        let course_id: Uuid = row.try_get(0)?;
        require_course_role(db, reader_user_id, course_id, "_lecturer").await?;

        let mut query = ContentQuery::new(Scope::Member(course_member_id), reader_user_id);
        query.course_content_id = Some(course_content_id);
        let rows = fetch_content_rows(db, &query).await?;
        let Some(row) = rows.first() else {
            return Err(CoreError::not_found("course_content"));
        };
        let mut result = StudentCourseContent::from(row);

        if row.submission_group_id.is_none() {
            let mut course_query =
                ContentQuery::new(Scope::Member(course_member_id), reader_user_id);
            course_query.course_id = Some(course_id);
            let course_rows = fetch_content_rows(db, &course_query).await?;
            let (status, unreviewed) =
                super::unit_status_from_rows(row.path.as_str(), &course_rows);
            result.status = status;
            result.unreviewed_count = unreviewed;
        }

        let related = vec![
            RelatedId::pair("course_member_id", &course_member_id.to_string()),
            RelatedId::pair("course_content_id", &course_content_id.to_string()),
            RelatedId::bare(format!("course_content:{course_content_id}")),
            RelatedId::pair("lecturer_view", &course_id.to_string()),
        ];
        self.ctx
            .set_cached_view(reader_user_id, &view_type, None, &result, Self::TTL, &related)
            .await;
        Ok(result)
    }

    /// List one member's course contents with submission and grading state.
    pub async fn list_course_contents(
        &self,
        course_member_id: Uuid,
        reader_user_id: Uuid,
        params: &CourseContentQueryParams,
    ) -> Result<Vec<StudentCourseContent>> {
        let view_type = format!("lecturer:course_contents:member:{course_member_id}");
        if let Some(cached) =
            self.ctx.get_cached_query_view(reader_user_id, &view_type, params).await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let row = db
            .query_opt("SELECT course_id FROM course_member WHERE id = $1", &[&course_member_id])
            .await?
            .ok_or_else(|| CoreError::not_found("course_member"))?;
        let course_id: Uuid = row.try_get(0)?;
        require_course_role(db, reader_user_id, course_id, "_lecturer").await?;

        let mut query = ContentQuery::new(Scope::Member(course_member_id), reader_user_id);
        query.course_id = params.course_id.or(Some(course_id));
        query.content_type_id = params.course_content_type_id;
        query.include_archived = params.include_archived.unwrap_or(false);
        if let Some(path) = &params.path {
            query.path_prefix = Some(Ltree::new(path.as_str())?);
        }
        let rows = fetch_content_rows(db, &query).await?;

        let mut contents: Vec<StudentCourseContent> =
            rows.iter().map(StudentCourseContent::from).collect();
        let missing = aggregate_unit_statuses(&mut contents);
        for index in missing {
            let mut course_query =
                ContentQuery::new(Scope::Member(course_member_id), reader_user_id);
            course_query.course_id = Some(contents[index].course_id);
            let course_rows = fetch_content_rows(db, &course_query).await?;
            let (status, unreviewed) = super::unit_status_from_rows(
                contents[index].path.as_str(),
                &course_rows,
            );
            contents[index].status = status;
            contents[index].unreviewed_count = unreviewed;
        }

        let mut related = vec![
            RelatedId::pair("course_member_id", &course_member_id.to_string()),
            RelatedId::pair("lecturer_view", &course_id.to_string()),
        ];
        for content in &contents {
            related.push(RelatedId::bare(format!("course_content:{}", content.id)));
        }
        self.ctx
            .set_cached_query_view(reader_user_id, &view_type, params, &contents, Self::TTL, related)
            .await;
        Ok(contents)
    }
}
