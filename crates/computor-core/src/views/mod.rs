//! View repositories: cached per-user projections.
//!
//! A view method's canonical read flow:
//!
//! 1. Build the user-scoped cache key (parameter hash included when the view
//!    takes parameters).
//! 2. Try the cache. **On a hit, no database connection is acquired.**
//! 3. On a miss, acquire the connection lazily and run the composite query.
//! 4. Map rows to DTOs; back-fill unit statuses whose descendants were
//!    filtered out of the result set.
//! 5. Compute related-id tags from query parameters and returned row
//!    identities, and store the serialized DTOs.

mod dto;
mod gradings;
mod lecturer;
mod student;
mod tutor;

use std::sync::Arc;
use std::time::Duration;

use computor_cache::{params_hash, Cache, RelatedId};
use computor_error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_postgres::Client;
use uuid::Uuid;

pub use dto::{
    CourseContentQueryParams, CourseMemberGradingsGet, CourseMemberGradingsList,
    CourseQueryParams, CourseRepositoryInfo, CourseView, StudentCourseContent,
};
pub use gradings::{CourseMemberGradingsViewRepository, GradingsQueryParams};
pub use lecturer::LecturerViewRepository;
pub use student::StudentViewRepository;
pub use tutor::TutorViewRepository;

use crate::db::{LazyDb, PgPool};
use crate::model::{CourseMember, GradingStatus};
use crate::query::CourseContentRow;

/// Shared state of one view repository instance: the optional cache handle
/// and the lazily-acquired database connection.
pub struct ViewContext {
    cache: Option<Arc<Cache>>,
    db:    LazyDb,
}

impl ViewContext {
    /// Build a context for one request.
    ///
    /// `audit_user_id` is stamped into the connection for write attribution
    /// when the lazy acquisition happens.
    #[must_use]
    pub fn new(pool: PgPool, cache: Option<Arc<Cache>>, audit_user_id: Option<Uuid>) -> Self {
        Self {
            cache,
            db: LazyDb::new(pool, audit_user_id),
        }
    }

    /// The lazily-acquired database handle (exposed for instrumentation).
    #[must_use]
    pub fn db(&self) -> &LazyDb {
        &self.db
    }

    pub(crate) async fn client(&self) -> Result<&Client> {
        Ok(self.db.client().await?)
    }

    pub(crate) async fn get_cached_view<T: DeserializeOwned>(
        &self,
        user_id: Uuid,
        view_type: &str,
        view_id: Option<&str>,
    ) -> Option<T> {
        let cache = self.cache.as_ref()?;
        cache.get_user_view(&user_id.to_string(), view_type, view_id).await
    }

    pub(crate) async fn set_cached_view<T: Serialize>(
        &self,
        user_id: Uuid,
        view_type: &str,
        view_id: Option<&str>,
        data: &T,
        ttl: Duration,
        related_ids: &[RelatedId],
    ) {
        if let Some(cache) = &self.cache {
            cache
                .set_user_view(
                    &user_id.to_string(),
                    view_type,
                    view_id,
                    data,
                    Some(ttl),
                    related_ids,
                )
                .await;
        }
    }

    pub(crate) async fn get_cached_query_view<T: DeserializeOwned, P: Serialize>(
        &self,
        user_id: Uuid,
        view_type: &str,
        params: &P,
    ) -> Option<T> {
        let full_view_type = format!("{view_type}:{}", params_hash(params));
        self.get_cached_view(user_id, &full_view_type, None).await
    }

    pub(crate) async fn set_cached_query_view<T: Serialize, P: Serialize>(
        &self,
        user_id: Uuid,
        view_type: &str,
        params: &P,
        data: &T,
        ttl: Duration,
        extra_related_ids: Vec<RelatedId>,
    ) {
        let full_view_type = format!("{view_type}:{}", params_hash(params));
        let mut related = related_ids_from_params(params);
        related.extend(extra_related_ids);
        self.set_cached_view(user_id, &full_view_type, None, data, ttl, &related).await;
    }
}

/// Extract `{field}:{value}` tags from every `*_id` parameter field.
///
/// Pagination and non-id filters never become tags; entity references always
/// do, so the cached projection dies with the entities it was filtered by.
#[must_use]
pub fn related_ids_from_params<P: Serialize>(params: &P) -> Vec<RelatedId> {
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(params) else {
        return Vec::new();
    };
    let mut related = Vec::new();
    for (key, value) in map {
        if !key.ends_with("_id") || value.is_null() {
            continue;
        }
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        related.push(RelatedId::pair(&key, &value));
    }
    related
}

/// Course-role ranking used by the permission gates.
fn role_rank(role: &str) -> u8 {
    match role {
        "_student" => 1,
        "_tutor" => 2,
        "_lecturer" => 3,
        "_maintainer" => 4,
        "_owner" => 5,
        _ => 0,
    }
}

/// Require that `user_id` holds at least `min_role` in `course_id`.
///
/// The error never discloses whether the course exists: lacking membership
/// and lacking the role read identically.
pub(crate) async fn require_course_role(
    db: &Client,
    user_id: Uuid,
    course_id: Uuid,
    min_role: &str,
) -> Result<CourseMember> {
    let row = db
        .query_opt(
            "SELECT id, course_id, user_id, course_role_id FROM course_member \
             WHERE course_id = $1 AND user_id = $2",
            &[&course_id, &user_id],
        )
        .await?;

    let member = row
        .map(|row| -> Result<CourseMember> {
            Ok(CourseMember {
                id:             row.try_get("id")?,
                course_id:      row.try_get("course_id")?,
                user_id:        row.try_get("user_id")?,
                course_role_id: row.try_get("course_role_id")?,
            })
        })
        .transpose()?;

    match member {
        Some(member) if role_rank(&member.course_role_id) >= role_rank(min_role) => Ok(member),
        _ => Err(CoreError::PermissionDenied {
            detail: format!("{min_role} role or higher is required"),
        }),
    }
}

/// Map composite rows to DTOs and back-fill unit statuses.
///
/// Units (rows without a submission group) derive their status from the
/// submittable descendants present in the same result set; `missing` collects
/// the units whose descendants were filtered out and need the course-scoped
/// fallback query.
pub(crate) fn aggregate_unit_statuses(
    contents: &mut [StudentCourseContent],
) -> Vec<usize> {
    let rows: Vec<(String, Option<Uuid>, Option<GradingStatus>, i64)> = contents
        .iter()
        .map(|c| {
            (c.path.as_str().to_string(), c.submission_group_id, c.status, c.unreviewed_count)
        })
        .collect();

    let mut missing = Vec::new();
    for (index, content) in contents.iter_mut().enumerate() {
        if content.submission_group_id.is_some() {
            continue;
        }
        let unit_prefix = format!("{}.", content.path.as_str());
        let mut statuses = Vec::new();
        let mut unreviewed = 0;
        for (path, group, status, row_unreviewed) in &rows {
            if group.is_some() && path.starts_with(&unit_prefix) {
                statuses.push(status.unwrap_or(GradingStatus::NotReviewed));
                unreviewed += row_unreviewed;
            }
        }
        if statuses.is_empty() {
            missing.push(index);
        } else {
            content.status = crate::aggregate::reduce_grading_status(&statuses);
            content.unreviewed_count = unreviewed;
        }
    }
    missing
}

/// Status reduction over the submittable descendants of one unit, computed
/// from a course-scoped row set (the fallback when the original result set
/// was filtered).
pub(crate) fn unit_status_from_rows(
    unit_path: &str,
    rows: &[CourseContentRow],
) -> (Option<GradingStatus>, i64) {
    let unit_prefix = format!("{unit_path}.");
    let mut statuses = Vec::new();
    let mut unreviewed = 0;
    for row in rows {
        if row.submission_group_id.is_some() && row.path.as_str().starts_with(&unit_prefix) {
            statuses.push(row.grading_status.unwrap_or(GradingStatus::NotReviewed));
            unreviewed += i64::from(row.is_unreviewed);
        }
    }
    (crate::aggregate::reduce_grading_status(&statuses), unreviewed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_related_ids_extracts_only_id_fields() {
        let params = json!({
            "course_id": "c1",
            "limit": 10,
            "path": "w1",
            "course_content_type_id": "t1"
        });
        let mut tags: Vec<String> =
            related_ids_from_params(&params).iter().map(|r| r.tag().to_string()).collect();
        tags.sort();
        assert_eq!(tags, vec!["course_content_type_id:t1", "course_id:c1"]);
    }

    #[test]
    fn test_related_ids_skip_null_fields() {
        let params = json!({"course_id": null});
        assert!(related_ids_from_params(&params).is_empty());
    }

    #[test]
    fn test_role_ranks_order() {
        assert!(role_rank("_tutor") > role_rank("_student"));
        assert!(role_rank("_lecturer") > role_rank("_tutor"));
        assert!(role_rank("_owner") > role_rank("_maintainer"));
        assert_eq!(role_rank("unknown"), 0);
    }
}
