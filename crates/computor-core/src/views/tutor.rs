//! Tutor view repository.
//!
//! Mirrors the student projections over a given course member, so a tutor
//! sees exactly what they need to grade. Unread counts are computed for the
//! *reader* (the tutor), not the member. Permission checks run on the miss
//! path: cache keys are reader-scoped, so no entry can exist for a reader
//! who never passed the gate, and a revoked reader ages out within the TTL.

use std::time::Duration;

use computor_cache::RelatedId;
use computor_error::{CoreError, Result};
use uuid::Uuid;

use super::dto::{CourseContentQueryParams, CourseQueryParams, CourseView, StudentCourseContent};
use super::{aggregate_unit_statuses, require_course_role, unit_status_from_rows, ViewContext};
use crate::model::Ltree;
use crate::query::{fetch_content_rows, ContentQuery, Scope};

/// Tutor projections over individual course members.
pub struct TutorViewRepository {
    ctx: ViewContext,
}

impl TutorViewRepository {
    /// Tutors get a 3-minute cache TTL (fresher data for grading).
    const TTL: Duration = Duration::from_secs(180);

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

    async fn member_course(&self, course_member_id: Uuid) -> Result<Uuid> {
        let db = self.ctx.client().await?;
        let row = db
            .query_opt("SELECT course_id FROM course_member WHERE id = $1", &[&course_member_id])
            .await?
            .ok_or_else(|| CoreError::not_found("course_member"))?;
        Ok(row.try_get(0)?)
    }

    /// Course content of one member, for grading.
    pub async fn get_course_content(
        &self,
        course_member_id: Uuid,
        course_content_id: Uuid,
        reader_user_id: Uuid,
    ) -> Result<StudentCourseContent> {
        let view_type = format!("tutor:member:{course_member_id}:content:{course_content_id}");
        if let Some(cached) = self.ctx.get_cached_view(reader_user_id, &view_type, None).await {
            return Ok(cached);
        }

        let course_id = self.member_course(course_member_id).await?;
        let db = self.ctx.client().await?;
        require_course_role(db, reader_user_id, course_id, "_tutor").await?;

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
            let (status, unreviewed) = unit_status_from_rows(row.path.as_str(), &course_rows);
            result.status = status;
            result.unreviewed_count = unreviewed;
        }

        let mut related = vec![
            RelatedId::pair("course_member_id", &course_member_id.to_string()),
            RelatedId::pair("course_content_id", &course_content_id.to_string()),
            RelatedId::bare(format!("course_content:{course_content_id}")),
            RelatedId::pair("tutor_view", &course_id.to_string()),
        ];
        if let Some(group_id) = result.submission_group_id {
            related.push(RelatedId::pair("submission_group", &group_id.to_string()));
        }
        self.ctx
            .set_cached_view(reader_user_id, &view_type, None, &result, Self::TTL, &related)
            .await;
        Ok(result)
    }

    /// List one member's course contents, for grading overviews.
    pub async fn list_course_contents(
        &self,
        course_member_id: Uuid,
        reader_user_id: Uuid,
        params: &CourseContentQueryParams,
    ) -> Result<Vec<StudentCourseContent>> {
        let view_type = format!("tutor:course_contents:member:{course_member_id}");
        if let Some(cached) =
            self.ctx.get_cached_query_view(reader_user_id, &view_type, params).await
        {
            return Ok(cached);
        }

        let course_id = self.member_course(course_member_id).await?;
        let db = self.ctx.client().await?;
        require_course_role(db, reader_user_id, course_id, "_tutor").await?;

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
            let (status, unreviewed) =
                unit_status_from_rows(contents[index].path.as_str(), &course_rows);
            contents[index].status = status;
            contents[index].unreviewed_count = unreviewed;
        }

        let mut related = vec![
            RelatedId::pair("course_member_id", &course_member_id.to_string()),
            RelatedId::pair("tutor_view", &course_id.to_string()),
        ];
        for content in &contents {
            related.push(RelatedId::bare(format!("course_content:{}", content.id)));
        }
        self.ctx
            .set_cached_query_view(reader_user_id, &view_type, params, &contents, Self::TTL, related)
            .await;
        Ok(contents)
    }

    /// A course as seen by a tutor (reference repository path).
    pub async fn get_course(&self, reader_user_id: Uuid, course_id: Uuid) -> Result<CourseView> {
        if let Some(cached) = self
            .ctx
            .get_cached_view(reader_user_id, "tutor:course", Some(&course_id.to_string()))
            .await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        require_course_role(db, reader_user_id, course_id, "_tutor").await?;
        let row = db
            .query_opt(
                "SELECT id, title, course_family_id, organization_id, \
                        path::text AS path, properties \
                 FROM course WHERE id = $1",
                &[&course_id],
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
            repository:       CourseView::repository_from_properties(properties.as_ref(), true),
        };

        let related = vec![RelatedId::pair("course_id", &course_id.to_string())];
        self.ctx
            .set_cached_view(
                reader_user_id,
                "tutor:course",
                Some(&course_id.to_string()),
                &course,
                Self::TTL,
                &related,
            )
            .await;
        Ok(course)
    }

    /// List courses where the reader holds a tutor role or higher.
    pub async fn list_courses(
        &self,
        reader_user_id: Uuid,
        params: &CourseQueryParams,
    ) -> Result<Vec<CourseView>> {
        if let Some(cached) =
            self.ctx.get_cached_query_view(reader_user_id, "tutor:courses", params).await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let mut sql = "SELECT c.id, c.title, c.course_family_id, c.organization_id, \
                              c.path::text AS path, c.properties \
                       FROM course c \
                       JOIN course_member cm ON cm.course_id = c.id \
                       WHERE cm.user_id = $1 \
                         AND cm.course_role_id IN ('_tutor', '_lecturer', '_maintainer', '_owner') \
                         AND c.archived_at IS NULL"
            .to_string();
        let mut query_params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
            vec![&reader_user_id];
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
                        true,
                    ),
                })
            })
            .collect::<Result<_>>()?;

        self.ctx
            .set_cached_query_view(
                reader_user_id,
                "tutor:courses",
                params,
                &courses,
                Self::TTL,
                Vec::new(),
            )
            .await;
        Ok(courses)
    }
}
