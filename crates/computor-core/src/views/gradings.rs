//! Course member gradings view repository.
//!
//! Dashboard-class projections: the per-member hierarchical rollup and the
//! course-wide batch listing. These are the widest aggregations in the
//! system, so they cache the longest (30 minutes) and pin themselves to
//! `cm_grading:{member_id}` — the tag every grade and artifact write fans
//! out to.

use std::time::Duration;

use computor_cache::RelatedId;
use computor_error::{CoreError, Result};
use tokio_postgres::Client;
use uuid::Uuid;

use super::dto::{CourseMemberGradingsGet, CourseMemberGradingsList};
use super::{require_course_role, ViewContext};
use crate::aggregate::{rollup_grading_stats, rollup_stats_for_all_members, MemberInfo};
use crate::query::gradings::{
    fetch_all_submitted_for_course, fetch_member_graded_contents,
    fetch_member_submitted_contents, fetch_path_titles, fetch_student_members,
    fetch_submittable_contents, GradingScope,
};

/// Query parameters of the gradings views.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GradingsQueryParams {
    /// Restrict to one course (defaults to the member's course).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id:              Option<Uuid>,
    /// Restrict to a subtree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix:            Option<String>,
    /// Restrict to one content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_content_type_id: Option<Uuid>,
    /// Cap rollup node depth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth:                  Option<usize>,
}

async fn fetch_member_info(db: &Client, course_member_id: Uuid) -> Result<Option<MemberInfo>> {
    let row = db
        .query_opt(
            "SELECT cm.id AS course_member_id, cm.user_id, \
                    u.username, u.given_name, u.family_name, sp.student_id \
             FROM course_member cm \
             JOIN \"user\" u ON u.id = cm.user_id \
             LEFT JOIN student_profile sp \
               ON sp.user_id = cm.user_id \
              AND sp.organization_id = \
                  (SELECT organization_id FROM course WHERE id = cm.course_id) \
             WHERE cm.id = $1",
            &[&course_member_id],
        )
        .await?;
    row.map(|row| -> Result<MemberInfo> {
        Ok(MemberInfo {
            course_member_id: row.try_get("course_member_id")?,
            user_id:          row.try_get("user_id")?,
            username:         row.try_get("username")?,
            given_name:       row.try_get("given_name")?,
            family_name:      row.try_get("family_name")?,
            student_id:       row.try_get("student_id")?,
        })
    })
    .transpose()
}

/// Grading-statistics projections per course member.
pub struct CourseMemberGradingsViewRepository {
    ctx: ViewContext,
}

impl CourseMemberGradingsViewRepository {
    /// Grading stats cached for 30 minutes (dashboard-style caching).
    const TTL: Duration = Duration::from_secs(1800);

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

    /// Full hierarchical grading statistics for one member.
    pub async fn get(
        &self,
        course_member_id: Uuid,
        reader_user_id: Uuid,
        params: &GradingsQueryParams,
    ) -> Result<CourseMemberGradingsGet> {
        let view_type = format!("cm_grading:{course_member_id}");
        if let Some(cached) = self.ctx.get_cached_view(reader_user_id, &view_type, None).await {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let member = fetch_member_info(db, course_member_id)
            .await?
            .ok_or_else(|| CoreError::not_found("course_member"))?;

        let member_course: Uuid = db
            .query_one("SELECT course_id FROM course_member WHERE id = $1", &[&course_member_id])
            .await?
            .try_get(0)?;
        let course_id = params.course_id.unwrap_or(member_course);
        if course_id != member_course {
            return Err(CoreError::not_found("course_member"));
        }
        require_course_role(db, reader_user_id, course_id, "_tutor").await?;

        // The cached dashboard always aggregates the full hierarchy; scoped
        // variants run uncached through the same rollup.
        let scope = GradingScope::default();
        let submittable = fetch_submittable_contents(db, course_id, &scope).await?;
        let submitted =
            fetch_member_submitted_contents(db, course_member_id, course_id, &scope).await?;
        let graded = fetch_member_graded_contents(db, course_member_id, course_id).await?;
        let titles = fetch_path_titles(db, course_id).await?;

        let rollup = rollup_grading_stats(&submittable, &submitted, &graded, &titles, params.depth);
        let result =
            CourseMemberGradingsGet::from_rollup(course_member_id, course_id, &member, rollup);

        let related = vec![
            RelatedId::pair("course_member_id", &course_member_id.to_string()),
            RelatedId::pair("course_id", &course_id.to_string()),
            RelatedId::pair("cm_grading", &course_member_id.to_string()),
        ];
        self.ctx
            .set_cached_view(reader_user_id, &view_type, None, &result, Self::TTL, &related)
            .await;
        Ok(result)
    }

    /// Course-level grading statistics for every enrolled student.
    ///
    /// One SQL aggregation covers all members; the per-member breakdown is a
    /// pure transform over it.
    pub async fn list(
        &self,
        course_id: Uuid,
        reader_user_id: Uuid,
        params: &GradingsQueryParams,
    ) -> Result<Vec<CourseMemberGradingsList>> {
        let view_type = format!("cm_gradings:course:{course_id}");
        if let Some(cached) =
            self.ctx.get_cached_query_view(reader_user_id, &view_type, params).await
        {
            return Ok(cached);
        }

        let db = self.ctx.client().await?;
        let exists = db.query_opt("SELECT id FROM course WHERE id = $1", &[&course_id]).await?;
        if exists.is_none() {
            return Err(CoreError::not_found("course"));
        }
        require_course_role(db, reader_user_id, course_id, "_tutor").await?;

        let members = fetch_student_members(db, course_id).await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let scope = GradingScope {
            path_prefix:     params
                .path_prefix
                .as_deref()
                .map(crate::model::Ltree::new)
                .transpose()?,
            content_type_id: params.course_content_type_id,
        };
        let submittable = fetch_submittable_contents(db, course_id, &scope).await?;
        let all_submitted = fetch_all_submitted_for_course(db, course_id, &scope).await?;

        let stats = rollup_stats_for_all_members(&submittable, &all_submitted, &members);
        let listing: Vec<CourseMemberGradingsList> = stats
            .into_iter()
            .map(|stats| CourseMemberGradingsList::from_stats(course_id, stats))
            .collect();

        // A course with no submittable content is returned but never cached:
        // the zeroed rows would otherwise outlive the first content creation.
        if submittable.is_empty() {
            return Ok(listing);
        }

        let mut related = vec![RelatedId::pair("course_id", &course_id.to_string())];
        for row in &listing {
            related.push(RelatedId::pair("cm_grading", &row.course_member_id.to_string()));
        }
        self.ctx
            .set_cached_query_view(reader_user_id, &view_type, params, &listing, Self::TTL, related)
            .await;
        Ok(listing)
    }
}
