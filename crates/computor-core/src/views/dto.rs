//! Projection DTOs.
//!
//! These records are the contract exposed to the HTTP layer: field names are
//! fixed, grading statuses serialize as their snake_case strings, grades stay
//! within `[0, 1]`, instants are ISO-8601, and tree paths are dotted labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{ContentTypeStats, GradingRollup, MemberGradingStats, RollupNode};
use crate::model::{GradingStatus, Ltree};
use crate::query::CourseContentRow;

/// Query parameters of the student/tutor content list views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseContentQueryParams {
    /// Restrict to one course.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id:              Option<Uuid>,
    /// Restrict to one content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_content_type_id: Option<Uuid>,
    /// Restrict to a subtree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path:                   Option<String>,
    /// Include archived contents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_archived:       Option<bool>,
}

/// Query parameters of the course list views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseQueryParams {
    /// Restrict to one course family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_family_id: Option<Uuid>,
    /// Restrict to one organization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id:  Option<Uuid>,
}

/// Git hosting coordinates of a course, surfaced to IDE clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRepositoryInfo {
    /// Hosting provider base URL.
    pub provider_url: Option<String>,
    /// Repository path under the provider.
    pub full_path:    Option<String>,
}

/// A course as seen by an enrolled user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseView {
    /// Course id.
    pub id:               Uuid,
    /// Display title.
    pub title:            Option<String>,
    /// Owning course family.
    pub course_family_id: Uuid,
    /// Owning organization.
    pub organization_id:  Uuid,
    /// Hierarchical path.
    pub path:             Ltree,
    /// Git hosting info, when provisioned.
    pub repository:       Option<CourseRepositoryInfo>,
}

impl CourseView {
    /// Extract hosting info from a course's provider properties.
    #[must_use]
    pub fn repository_from_properties(
        properties: Option<&serde_json::Value>,
        reference_suffix: bool,
    ) -> Option<CourseRepositoryInfo> {
        let gitlab = properties?.get("gitlab")?;
        let full_path = gitlab.get("full_path").and_then(|v| v.as_str()).map(|path| {
            if reference_suffix {
                format!("{path}/reference")
            } else {
                path.to_string()
            }
        });
        Some(CourseRepositoryInfo {
            provider_url: gitlab.get("url").and_then(|v| v.as_str()).map(String::from),
            full_path,
        })
    }
}

/// One course content in a student (or member-scoped) projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentCourseContent {
    /// Content id.
    pub id: Uuid,
    /// Owning course.
    pub course_id: Uuid,
    /// Owning course family.
    pub course_family_id: Uuid,
    /// Tree position.
    pub path: Ltree,
    /// Display title.
    pub title: Option<String>,
    /// Content type.
    pub course_content_type_id: Uuid,
    /// Whether this content receives submissions.
    pub submittable: bool,
    /// Sibling ordering.
    pub position: f64,
    /// Submission limit, when one applies.
    pub max_submissions: Option<i32>,
    /// The user's submission group, when one exists.
    pub submission_group_id: Option<Uuid>,
    /// Finished test results.
    pub result_count: i64,
    /// Latest test result value.
    pub latest_result: Option<f64>,
    /// Latest test result instant.
    pub latest_result_at: Option<DateTime<Utc>>,
    /// Official submissions.
    pub submission_count: i64,
    /// Latest grading status; for units, the descendant reduction.
    pub status: Option<GradingStatus>,
    /// Latest grade value.
    pub grading: Option<f64>,
    /// Messages unread by the reader on this content and its group.
    pub unread_message_count: i64,
    /// Latest submissions lacking review; for units, summed over descendants.
    pub unreviewed_count: i64,
    /// Deployment status, when the content is deployed.
    pub deployment_status: Option<String>,
}

impl From<&CourseContentRow> for StudentCourseContent {
    fn from(row: &CourseContentRow) -> Self {
        // Units have no group; their status is back-filled by the caller
        // from descendant reductions.
        let status = if row.submission_group_id.is_some() {
            Some(row.grading_status.unwrap_or(GradingStatus::NotReviewed))
        } else {
            None
        };
        Self {
            id: row.course_content_id,
            course_id: row.course_id,
            course_family_id: row.course_family_id,
            path: row.path.clone(),
            title: row.title.clone(),
            course_content_type_id: row.course_content_type_id,
            submittable: row.submittable,
            position: row.position,
            max_submissions: row.max_submissions,
            submission_group_id: row.submission_group_id,
            result_count: row.result_count,
            latest_result: row.latest_result,
            latest_result_at: row.latest_result_at,
            submission_count: row.submission_count,
            status,
            grading: row.grading,
            unread_message_count: row.unread_message_count(),
            unreviewed_count: i64::from(row.is_unreviewed),
            deployment_status: row.deployment_status.clone(),
        }
    }
}

/// Full grading dashboard for one course member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseMemberGradingsGet {
    /// Course member id.
    pub course_member_id: Uuid,
    /// Course id.
    pub course_id: Uuid,
    /// User id.
    pub user_id: Option<Uuid>,
    /// Login name.
    pub username: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Student number within the organization.
    pub student_id: Option<String>,
    /// All submittable contents in scope.
    pub total_max_assignments: u32,
    /// Of those, how many were submitted.
    pub total_submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub overall_progress_percentage: f64,
    /// Latest submission overall.
    pub latest_submission_at: Option<DateTime<Utc>>,
    /// Average grade overall, missing grades as 0.
    pub overall_average_grading: Option<f64>,
    /// Course-level breakdown by content type.
    pub by_content_type: Vec<ContentTypeStats>,
    /// One node per path prefix of the content tree.
    pub nodes: Vec<RollupNode>,
}

impl CourseMemberGradingsGet {
    /// Combine a member identity with their computed rollup.
    #[must_use]
    pub fn from_rollup(
        course_member_id: Uuid,
        course_id: Uuid,
        member: &crate::aggregate::MemberInfo,
        rollup: GradingRollup,
    ) -> Self {
        Self {
            course_member_id,
            course_id,
            user_id: member.user_id,
            username: member.username.clone(),
            given_name: member.given_name.clone(),
            family_name: member.family_name.clone(),
            student_id: member.student_id.clone(),
            total_max_assignments: rollup.total_max_assignments,
            total_submitted_assignments: rollup.total_submitted_assignments,
            overall_progress_percentage: rollup.overall_progress_percentage,
            latest_submission_at: rollup.latest_submission_at,
            overall_average_grading: rollup.overall_average_grading,
            by_content_type: rollup.by_content_type,
            nodes: rollup.nodes,
        }
    }
}

/// One member's row in the course-wide grading listing (no hierarchy nodes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseMemberGradingsList {
    /// Course member id.
    pub course_member_id: Uuid,
    /// Course id.
    pub course_id: Uuid,
    /// User id.
    pub user_id: Option<Uuid>,
    /// Login name.
    pub username: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Student number within the organization.
    pub student_id: Option<String>,
    /// All submittable contents in scope.
    pub total_max_assignments: u32,
    /// Of those, how many this member submitted.
    pub total_submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub overall_progress_percentage: f64,
    /// This member's latest submission.
    pub latest_submission_at: Option<DateTime<Utc>>,
    /// Breakdown by content type.
    pub by_content_type: Vec<ContentTypeStats>,
}

impl CourseMemberGradingsList {
    /// Build a listing row from batch statistics.
    #[must_use]
    pub fn from_stats(course_id: Uuid, stats: MemberGradingStats) -> Self {
        Self {
            course_member_id: stats.member.course_member_id,
            course_id,
            user_id: stats.member.user_id,
            username: stats.member.username,
            given_name: stats.member.given_name,
            family_name: stats.member.family_name,
            student_id: stats.member.student_id,
            total_max_assignments: stats.total_max_assignments,
            total_submitted_assignments: stats.total_submitted_assignments,
            overall_progress_percentage: stats.overall_progress_percentage,
            latest_submission_at: stats.latest_submission_at,
            by_content_type: stats.by_content_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_repository_info_from_properties() {
        let properties = json!({
            "gitlab": {"url": "https://git.example.org", "full_path": "kit/prog1"}
        });
        let info = CourseView::repository_from_properties(Some(&properties), false)
            .expect("gitlab present");
        assert_eq!(info.provider_url.as_deref(), Some("https://git.example.org"));
        assert_eq!(info.full_path.as_deref(), Some("kit/prog1"));
    }

    #[test]
    fn test_repository_info_reference_suffix() {
        let properties = json!({"gitlab": {"full_path": "kit/prog1"}});
        let info = CourseView::repository_from_properties(Some(&properties), true)
            .expect("gitlab present");
        assert_eq!(info.full_path.as_deref(), Some("kit/prog1/reference"));
    }

    #[test]
    fn test_repository_info_absent_without_gitlab() {
        assert!(CourseView::repository_from_properties(None, false).is_none());
        let properties = json!({"other": {}});
        assert!(CourseView::repository_from_properties(Some(&properties), false).is_none());
    }

    #[test]
    fn test_status_serializes_as_contract_string() {
        let params = CourseContentQueryParams::default();
        // Unset fields are skipped so the params hash of {} and all-None match.
        assert_eq!(serde_json::to_string(&params).expect("serialize"), "{}");

        let status = Some(GradingStatus::ImprovementPossible);
        assert_eq!(
            serde_json::to_string(&status).expect("serialize"),
            "\"improvement_possible\""
        );
    }
}
