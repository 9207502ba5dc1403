//! Declarative mapping configuration.
//!
//! The JSON schema mapping arbitrary table columns onto deployment fields.
//! Every field entry is one of: a column reference (plain string), a literal
//! (bool/number), or a rule object carrying a literal, a `{var}` template, a
//! reference to a previously computed field, or a column source — optionally
//! with a named transformation, a default, and a required flag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldConfig {
    /// Column reference — or, when no such column exists, a literal string.
    Column(String),
    /// Literal boolean.
    Bool(bool),
    /// Literal number.
    Number(f64),
    /// Full rule object.
    Rule(MappingRule),
}

/// The object form of a field mapping.
///
/// Exactly one of `literal`, `reference`, `template`, or `source` is expected;
/// they are consulted in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Verbatim value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal:   Option<Value>,
    /// Reference to an already-computed field by name.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// `{var}` template over the accumulated context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template:  Option<String>,
    /// Source column name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source:    Option<String>,
    /// Named transformation applied to the resolved value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Fallback when the resolved value is null/empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default:   Option<Value>,
    /// Error when the resolved value is null/empty.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required:  bool,
}

/// Field mappings for [`super::UserDeployment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFieldsConfig {
    /// Given name mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name:  Option<FieldConfig>,
    /// Family name mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<FieldConfig>,
    /// Email mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email:       Option<FieldConfig>,
    /// External number mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number:      Option<FieldConfig>,
    /// Username mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username:    Option<FieldConfig>,
    /// User type mapping (defaults to `user` downstream).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type:   Option<FieldConfig>,
    /// Password mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password:    Option<FieldConfig>,
    /// Roles mapping (comma-splittable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles:       Option<FieldConfig>,
}

/// Field mappings for [`super::AccountDeployment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountFieldsConfig {
    /// Provider mapping; plain string when constant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider:            Option<FieldConfig>,
    /// Account type mapping.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub account_type:        Option<FieldConfig>,
    /// Provider-side account id mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_account_id: Option<FieldConfig>,
    /// Provider-side email mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email:               Option<FieldConfig>,
    /// Admin flag mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin:            Option<FieldConfig>,
}

/// Field mappings for [`super::CourseMemberDeployment`].
///
/// A mapping may list several of these; each entry can be guarded by a
/// `condition`, so one row can yield multiple memberships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseMemberFieldsConfig {
    /// Course id mapping (direct identification).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id:            Option<FieldConfig>,
    /// Organization path segment mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization:  Option<FieldConfig>,
    /// Course family path segment mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_family: Option<FieldConfig>,
    /// Course path segment mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course:        Option<FieldConfig>,
    /// Role mapping, defaults to `_student`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role:          Option<FieldConfig>,
    /// Group label mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group:         Option<FieldConfig>,
    /// Guard expression: `{var} != ""`, `{var} == "value"`, or truthiness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition:     Option<String>,
}

/// One-or-many wrapper for course-member mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CourseMemberMappings {
    /// A single membership mapping.
    One(CourseMemberFieldsConfig),
    /// Multiple membership mappings, each independently guarded.
    Many(Vec<CourseMemberFieldsConfig>),
}

impl CourseMemberMappings {
    /// Iterate the mappings regardless of form.
    pub fn iter(&self) -> impl Iterator<Item = &CourseMemberFieldsConfig> {
        match self {
            Self::One(config) => std::slice::from_ref(config).iter(),
            Self::Many(configs) => configs.iter(),
        }
    }
}

/// Global transformation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationsConfig {
    /// Values treated as null/empty.
    #[serde(default = "default_null_values")]
    pub null_values:    Vec<String>,
    /// Fallback values injected into the context when a column is absent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_values: BTreeMap<String, Value>,
}

fn default_null_values() -> Vec<String> {
    ["", "null", "NULL", "None", "N/A", "-", "n/a"].map(String::from).to_vec()
}

impl TransformationsConfig {
    /// Whether `value` should be treated as null under these rules.
    #[must_use]
    pub fn is_null(&self, value: &str) -> bool {
        self.null_values.iter().any(|n| n == value.trim())
    }
}

/// Root mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentMappingConfig {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version:              String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description:          Option<String>,
    /// User field mappings.
    pub user_fields:          UserFieldsConfig,
    /// Account field mappings; absent means no accounts are created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_fields:       Option<AccountFieldsConfig>,
    /// Membership field mappings, single or list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_member_fields: Option<CourseMemberMappings>,
    /// Global transformation rules.
    #[serde(default)]
    pub transformations:      TransformationsConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_field_config_forms_deserialize() {
        let column: FieldConfig = serde_json::from_value(json!("Email")).expect("column");
        assert_eq!(column, FieldConfig::Column("Email".to_string()));

        let flag: FieldConfig = serde_json::from_value(json!(true)).expect("bool");
        assert_eq!(flag, FieldConfig::Bool(true));

        let rule: FieldConfig = serde_json::from_value(
            json!({"template": "{email}", "transform": "extract_username"}),
        )
        .expect("rule");
        match rule {
            FieldConfig::Rule(rule) => {
                assert_eq!(rule.template.as_deref(), Some("{email}"));
                assert_eq!(rule.transform.as_deref(), Some("extract_username"));
            },
            other => panic!("expected rule, got {other:?}"),
        }
    }

    #[test]
    fn test_course_member_mappings_single_and_list() {
        let single: CourseMemberMappings =
            serde_json::from_value(json!({"course": "prog1"})).expect("single");
        assert_eq!(single.iter().count(), 1);

        let many: CourseMemberMappings =
            serde_json::from_value(json!([{"course": "prog1"}, {"course": "prog2"}]))
                .expect("list");
        assert_eq!(many.iter().count(), 2);
    }

    #[test]
    fn test_full_config_parses() {
        let config: DeploymentMappingConfig = serde_json::from_value(json!({
            "version": "1.0",
            "description": "Student import mapping",
            "user_fields": {
                "given_name": "First Name",
                "family_name": "Last Name",
                "email": "Email",
                "username": {"template": "{email}", "transform": "extract_username"},
                "number": "Student ID"
            },
            "account_fields": {
                "provider": "gitlab",
                "type": "oauth",
                "provider_account_id": {"ref": "username"}
            },
            "course_member_fields": {
                "organization": {"literal": "kit"},
                "course_family": {"literal": "prog"},
                "course": {"literal": "prog1"},
                "group": "Group",
                "condition": "{Group} != \"\""
            }
        }))
        .expect("config");

        assert_eq!(config.version, "1.0");
        assert!(config.account_fields.is_some());
        assert!(config.transformations.is_null(""));
        assert!(config.transformations.is_null("N/A"));
        assert!(!config.transformations.is_null("Group A"));
    }
}
