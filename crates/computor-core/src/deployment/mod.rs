//! Deployment mapping: table rows → user/account/membership configs.
//!
//! A declarative JSON mapping drives the conversion of tabular imports
//! (CSV exports from campus systems) into deployment configurations. The
//! output feeds bulk user and course-member creation, and each created
//! membership row emits the member invalidation cascade through its
//! repository.

mod config;
mod mapper;
mod transform;

pub use config::{
    AccountFieldsConfig, CourseMemberFieldsConfig, CourseMemberMappings, DeploymentMappingConfig,
    FieldConfig, MappingRule, TransformationsConfig, UserFieldsConfig,
};
pub use mapper::{parse_csv_text, DeploymentMapper, TableRow};
pub use transform::{apply_transformation, substitute_template};

use serde::{Deserialize, Serialize};

/// Error produced while mapping rows to deployment configs.
///
/// Row errors are collected across the whole input and reported together so
/// an operator can fix a file in one pass.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// The mapping configuration itself is invalid.
    #[error("Invalid mapping config: {0}")]
    Config(String),

    /// One or more rows failed to map.
    #[error("Mapping errors:\n{}", .0.join("\n"))]
    Rows(Vec<String>),

    /// A required field resolved to null/empty.
    #[error("Required field '{0}' is missing or empty")]
    MissingRequired(String),

    /// An unknown transformation name was referenced.
    #[error("Unknown transformation: {0}")]
    UnknownTransformation(String),
}

/// A user to provision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDeployment {
    /// Given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name:  Option<String>,
    /// Family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email:       Option<String>,
    /// External number (student/staff id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number:      Option<String>,
    /// Login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username:    Option<String>,
    /// Account type, defaults to `user`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type:   Option<String>,
    /// Initial password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password:    Option<String>,
    /// Platform roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles:       Option<Vec<String>>,
}

/// An external account to attach to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDeployment {
    /// Provider (e.g. `gitlab`).
    pub provider:            String,
    /// Account type (e.g. `oauth`).
    #[serde(rename = "type")]
    pub account_type:        String,
    /// Provider-side account id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_account_id: Option<String>,
    /// Provider-side email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email:               Option<String>,
    /// Whether the account has admin privileges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin:            Option<bool>,
}

/// A course membership to provision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseMemberDeployment {
    /// Course id, when identified directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id:            Option<String>,
    /// Organization path segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization:  Option<String>,
    /// Course family path segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_family: Option<String>,
    /// Course path segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course:        Option<String>,
    /// Course role, defaults to `_student`.
    pub role:          String,
    /// Assignment group label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group:         Option<String>,
}

/// One mapped row: a user with accounts and memberships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAccountDeployment {
    /// The user.
    pub user:           UserDeployment,
    /// Attached external accounts.
    pub accounts:       Vec<AccountDeployment>,
    /// Course memberships.
    pub course_members: Vec<CourseMemberDeployment>,
}

/// The full deployment configuration produced from a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersDeploymentConfig {
    /// All mapped users.
    pub users: Vec<UserAccountDeployment>,
}
