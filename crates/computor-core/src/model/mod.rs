//! Entity model.
//!
//! Plain serializable records mirroring the durable rows the coherency layer
//! manipulates. Relationships are not embedded — callers that need related
//! entities do follow-up reads — so the structs round-trip cleanly through
//! the cache's neutral JSON representation.

mod grading;
mod ltree;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use grading::GradingStatus;
pub use ltree::Ltree;

/// Top-level tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Row id.
    pub id:         Uuid,
    /// Hierarchical path of the organization.
    pub path:       Ltree,
    /// Display title.
    pub title:      Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// A family of related courses inside an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseFamily {
    /// Row id.
    pub id:              Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Hierarchical path.
    pub path:            Ltree,
    /// Display title.
    pub title:           Option<String>,
}

/// One course instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Row id.
    pub id:               Uuid,
    /// Owning course family.
    pub course_family_id: Uuid,
    /// Owning organization (denormalized from the family).
    pub organization_id:  Uuid,
    /// Display title.
    pub title:            Option<String>,
    /// Hierarchical path.
    pub path:             Ltree,
    /// Set when the course is archived.
    pub archived_at:      Option<DateTime<Utc>>,
    /// Provider-specific properties (e.g. Git hosting coordinates).
    pub properties:       Option<serde_json::Value>,
}

/// A node of a course's content tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseContent {
    /// Row id.
    pub id:                     Uuid,
    /// Owning course.
    pub course_id:              Uuid,
    /// Position in the tree, dotted labels.
    pub path:                   Ltree,
    /// Display title.
    pub title:                  Option<String>,
    /// Content type (assignment, reading, ...).
    pub course_content_type_id: Uuid,
    /// Content kind; kinds carry the submittable flag.
    pub course_content_kind_id: String,
    /// Ordering among siblings.
    pub position:               f64,
    /// Test-run limit, overridable per submission group.
    pub max_test_runs:          Option<i32>,
    /// Submission limit, overridable per submission group.
    pub max_submissions:        Option<i32>,
    /// Set when soft-deleted.
    pub archived_at:            Option<DateTime<Utc>>,
}

/// Content type: slug, title, and display color, tied to a kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseContentType {
    /// Row id.
    pub id:                     Uuid,
    /// Stable slug.
    pub slug:                   String,
    /// Display title.
    pub title:                  Option<String>,
    /// Display color.
    pub color:                  Option<String>,
    /// Owning kind.
    pub course_content_kind_id: String,
}

/// Content kind; `submittable` marks kinds that receive student submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseContentKind {
    /// Kind id (e.g. `assignment`, `unit`).
    pub id:          String,
    /// Whether contents of this kind receive submissions.
    pub submittable: bool,
}

/// Deployment state of an example into a course content (1:1 expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseContentDeployment {
    /// Row id.
    pub id:                 Uuid,
    /// The content this deployment provisions.
    pub course_content_id:  Uuid,
    /// Deployed example version, when pinned.
    pub example_version_id: Option<Uuid>,
    /// Deployment lifecycle status.
    pub deployment_status:  String,
    /// Identifier of the deployed example (labeled tree path).
    pub example_identifier: Option<Ltree>,
    /// Workflow task driving the deployment, when one is running.
    pub workflow_id:        Option<String>,
}

/// A reusable example (assignment template).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    /// Row id.
    pub id:         Uuid,
    /// Identifier as a labeled tree path (e.g. `itp.py.hello`).
    pub identifier: Ltree,
    /// Implementation language.
    pub language:   Option<String>,
    /// Whether the example is visible outside its owning organization.
    pub is_public:  Option<bool>,
}

/// An immutable version of an example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleVersion {
    /// Row id.
    pub id:             Uuid,
    /// Parent example.
    pub example_id:     Uuid,
    /// Sequential version number.
    pub version_number: i32,
    /// Human version tag (e.g. `v1.0`).
    pub version_tag:    Option<String>,
    /// Path in object storage.
    pub storage_path:   Option<String>,
    /// Creation instant.
    pub created_at:     DateTime<Utc>,
}

/// Membership of a user in a course, with a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseMember {
    /// Row id.
    pub id:             Uuid,
    /// Course.
    pub course_id:      Uuid,
    /// User.
    pub user_id:        Uuid,
    /// Role (`_student`, `_tutor`, `_lecturer`, ...).
    pub course_role_id: String,
}

/// Per-assignment group of members submitting together.
///
/// Groups are course-scoped for life: `course_id` never changes after
/// creation, so group→course lookups cache without invalidation risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionGroup {
    /// Row id.
    pub id:                Uuid,
    /// Owning course (immutable).
    pub course_id:         Uuid,
    /// The assignment this group submits for.
    pub course_content_id: Uuid,
    /// Test-run limit override.
    pub max_test_runs:     Option<i32>,
    /// Submission limit override.
    pub max_submissions:   Option<i32>,
}

/// Membership of a course member in a submission group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionGroupMember {
    /// Row id.
    pub id:                  Uuid,
    /// Group.
    pub submission_group_id: Uuid,
    /// Member.
    pub course_member_id:    Uuid,
}

/// An uploaded artifact; immutable once uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionArtifact {
    /// Row id.
    pub id:                           Uuid,
    /// Owning group.
    pub submission_group_id:          Uuid,
    /// Member who uploaded, when known.
    pub uploaded_by_course_member_id: Option<Uuid>,
    /// Whether this upload counts as an official submission.
    pub submit:                       bool,
    /// Upload instant.
    pub created_at:                   DateTime<Utc>,
}

/// A grade on an artifact; append-only, latest wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionGrade {
    /// Row id.
    pub id:                          Uuid,
    /// Graded artifact.
    pub artifact_id:                 Uuid,
    /// Grading member, when known.
    pub graded_by_course_member_id:  Option<Uuid>,
    /// Grade in `[0, 1]`.
    pub grade:                       f64,
    /// Review status.
    pub status:                      GradingStatus,
    /// Grading instant.
    pub graded_at:                   DateTime<Utc>,
}

/// A test result produced by the testing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Row id.
    pub id:                     Uuid,
    /// The content the test ran against.
    pub course_content_id:      Uuid,
    /// The submitting group.
    pub submission_group_id:    Uuid,
    /// The artifact tested, when the run was tied to an upload.
    pub submission_artifact_id: Option<Uuid>,
    /// Test system that executed the run; `None` while pending.
    pub test_system_id:         Option<String>,
    /// Execution status (0 = finished).
    pub status:                 i32,
    /// Achieved result in `[0, 1]`.
    pub result:                 Option<f64>,
    /// Run instant.
    pub created_at:             DateTime<Utc>,
}

/// A message targeted at a user, group, content, or course; soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Row id.
    pub id:                  Uuid,
    /// Author.
    pub author_id:           Uuid,
    /// Targeted content, when content-scoped.
    pub course_content_id:   Option<Uuid>,
    /// Targeted group, when group-scoped.
    pub submission_group_id: Option<Uuid>,
    /// Targeted course, when course-scoped.
    pub course_id:           Option<Uuid>,
    /// Targeted user, when user-scoped.
    pub user_id:             Option<Uuid>,
    /// Set when soft-deleted.
    pub archived_at:         Option<DateTime<Utc>>,
}

/// Read receipt for a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRead {
    /// Row id.
    pub id:             Uuid,
    /// The message read.
    pub message_id:     Uuid,
    /// The reader.
    pub reader_user_id: Uuid,
}

/// A platform user (identity fields only; auth lives elsewhere).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id:          Uuid,
    /// Login name.
    pub username:    Option<String>,
    /// Given name.
    pub given_name:  Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Email address.
    pub email:       Option<String>,
}

/// A revocable API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    /// Row id.
    pub id:           Uuid,
    /// Owning user.
    pub user_id:      Uuid,
    /// User-chosen token name.
    pub name:         Option<String>,
    /// Hash of the secret, hex-encoded.
    pub token_hash:   String,
    /// Displayable token prefix.
    pub token_prefix: String,
    /// Set when revoked.
    pub revoked_at:   Option<DateTime<Utc>>,
}
