//! Core deployment mapper.

use std::collections::BTreeMap;

use serde_json::Value;

use super::config::{
    AccountFieldsConfig, CourseMemberFieldsConfig, DeploymentMappingConfig, FieldConfig,
    MappingRule, UserFieldsConfig,
};
use super::transform::{apply_transformation, substitute_template};
use super::{
    AccountDeployment, CourseMemberDeployment, MappingError, UserAccountDeployment,
    UserDeployment, UsersDeploymentConfig,
};

/// One table row: column name → raw value.
pub type TableRow = BTreeMap<String, String>;

/// Maps table rows to deployment configurations.
///
/// Fields are evaluated left to right with an accumulating context, so later
/// fields may reference earlier ones (`{"ref": "username"}`). A reference to
/// a not-yet-populated key resolves to null; no topological resolution is
/// attempted, which is also how reference cycles degrade.
pub struct DeploymentMapper {
    config: DeploymentMappingConfig,
}

impl DeploymentMapper {
    /// Build a mapper from a parsed configuration.
    #[must_use]
    pub fn new(config: DeploymentMappingConfig) -> Self {
        Self { config }
    }

    /// Build a mapper from raw JSON.
    pub fn from_json(value: &Value) -> Result<Self, MappingError> {
        let config = serde_json::from_value(value.clone())
            .map_err(|err| MappingError::Config(err.to_string()))?;
        Ok(Self::new(config))
    }

    /// Map all rows, collecting per-row errors into one report.
    pub fn map_rows(&self, rows: &[TableRow]) -> Result<UsersDeploymentConfig, MappingError> {
        let mut users = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match self.map_row(row) {
                Ok(user) => users.push(user),
                Err(err) => errors.push(format!("Row {}: {err}", index + 1)),
            }
        }

        if errors.is_empty() {
            Ok(UsersDeploymentConfig { users })
        } else {
            Err(MappingError::Rows(errors))
        }
    }

    fn map_row(&self, row: &TableRow) -> Result<UserAccountDeployment, MappingError> {
        let mut context = self.build_context(row);
        let user = self.map_user_fields(row, &mut context)?;

        let accounts = match &self.config.account_fields {
            Some(account_fields) => {
                self.map_account_fields(account_fields, row, &context)?.into_iter().collect()
            },
            None => Vec::new(),
        };

        let course_members = match &self.config.course_member_fields {
            Some(mappings) => {
                let mut members = Vec::new();
                for mapping in mappings.iter() {
                    if let Some(member) = self.map_course_member(mapping, row, &context)? {
                        members.push(member);
                    }
                }
                members
            },
            None => Vec::new(),
        };

        Ok(UserAccountDeployment {
            user,
            accounts,
            course_members,
        })
    }

    fn build_context(&self, row: &TableRow) -> BTreeMap<String, String> {
        let mut context = row.clone();
        for (key, value) in &self.config.transformations.default_values {
            let missing = context.get(key).is_none_or(|v| self.is_null(v));
            if missing {
                if let Some(value) = value_to_string(value) {
                    context.insert(key.clone(), value);
                }
            }
        }
        context
    }

    fn is_null(&self, value: &str) -> bool {
        self.config.transformations.is_null(value)
    }

    fn map_user_fields(
        &self,
        row: &TableRow,
        context: &mut BTreeMap<String, String>,
    ) -> Result<UserDeployment, MappingError> {
        let fields: &UserFieldsConfig = &self.config.user_fields;
        let mut user = UserDeployment::default();

        // Fixed evaluation order; each computed field lands in the context so
        // the next one can reference it.
        let entries: [(&str, Option<&FieldConfig>); 7] = [
            ("given_name", fields.given_name.as_ref()),
            ("family_name", fields.family_name.as_ref()),
            ("email", fields.email.as_ref()),
            ("number", fields.number.as_ref()),
            ("username", fields.username.as_ref()),
            ("user_type", fields.user_type.as_ref()),
            ("password", fields.password.as_ref()),
        ];
        for (name, config) in entries {
            let Some(config) = config else { continue };
            let Some(value) = self.eval_field(config, row, context, name)? else {
                continue;
            };
            if let Some(text) = value_to_string(&value) {
                context.insert(name.to_string(), text.clone());
                match name {
                    "given_name" => user.given_name = Some(text),
                    "family_name" => user.family_name = Some(text),
                    "email" => user.email = Some(text),
                    "number" => user.number = Some(text),
                    "username" => user.username = Some(text),
                    "user_type" => user.user_type = Some(text),
                    "password" => user.password = Some(text),
                    _ => {},
                }
            }
        }
        if user.user_type.is_none() {
            user.user_type = Some("user".to_string());
        }

        if let Some(config) = &fields.roles {
            if let Some(value) = self.eval_field(config, row, context, "roles")? {
                user.roles = Some(match value {
                    Value::Array(items) => {
                        items.iter().filter_map(value_to_string_ref).collect()
                    },
                    other => value_to_string(&other)
                        .map(|text| {
                            text.split(',').map(|role| role.trim().to_string()).collect()
                        })
                        .unwrap_or_default(),
                });
            }
        }

        Ok(user)
    }

    fn map_account_fields(
        &self,
        fields: &AccountFieldsConfig,
        row: &TableRow,
        context: &BTreeMap<String, String>,
    ) -> Result<Option<AccountDeployment>, MappingError> {
        let provider = self
            .eval_string(fields.provider.as_ref(), row, context, "provider")?
            .unwrap_or_else(|| "gitlab".to_string());
        let account_type = self
            .eval_string(fields.account_type.as_ref(), row, context, "type")?
            .unwrap_or_else(|| "oauth".to_string());

        let provider_account_id =
            self.eval_string(fields.provider_account_id.as_ref(), row, context, "provider_account_id")?;
        let email = self.eval_string(fields.email.as_ref(), row, context, "email")?;
        let is_admin = match &fields.is_admin {
            Some(config) => self
                .eval_field(config, row, context, "is_admin")?
                .and_then(|value| match value {
                    Value::Bool(flag) => Some(flag),
                    Value::String(text) => Some(matches!(
                        text.to_lowercase().trim(),
                        "true" | "yes" | "y" | "1" | "on"
                    )),
                    _ => None,
                }),
            None => None,
        };

        Ok(Some(AccountDeployment {
            provider,
            account_type,
            provider_account_id,
            email,
            is_admin,
        }))
    }

    fn map_course_member(
        &self,
        mapping: &CourseMemberFieldsConfig,
        row: &TableRow,
        context: &BTreeMap<String, String>,
    ) -> Result<Option<CourseMemberDeployment>, MappingError> {
        if let Some(condition) = &mapping.condition {
            if !evaluate_condition(condition, context) {
                return Ok(None);
            }
        }

        let id = self.eval_string(mapping.id.as_ref(), row, context, "id")?;
        let organization =
            self.eval_string(mapping.organization.as_ref(), row, context, "organization")?;
        let course_family =
            self.eval_string(mapping.course_family.as_ref(), row, context, "course_family")?;
        let course = self.eval_string(mapping.course.as_ref(), row, context, "course")?;
        let role = self
            .eval_string(mapping.role.as_ref(), row, context, "role")?
            .unwrap_or_else(|| "_student".to_string());
        let group = self.eval_string(mapping.group.as_ref(), row, context, "group")?;

        let has_id = id.is_some();
        let has_path = organization.is_some() && course_family.is_some() && course.is_some();
        if !has_id && !has_path {
            return Ok(None);
        }

        Ok(Some(CourseMemberDeployment {
            id,
            organization,
            course_family,
            course,
            role,
            group,
        }))
    }

    fn eval_string(
        &self,
        config: Option<&FieldConfig>,
        row: &TableRow,
        context: &BTreeMap<String, String>,
        field_name: &str,
    ) -> Result<Option<String>, MappingError> {
        match config {
            Some(config) => Ok(self
                .eval_field(config, row, context, field_name)?
                .as_ref()
                .and_then(value_to_string)),
            None => Ok(None),
        }
    }

    /// Resolve one field entry against the row and accumulated context.
    fn eval_field(
        &self,
        config: &FieldConfig,
        row: &TableRow,
        context: &BTreeMap<String, String>,
        field_name: &str,
    ) -> Result<Option<Value>, MappingError> {
        match config {
            // Column reference when the column exists, literal otherwise.
            FieldConfig::Column(name) => {
                if let Some(raw) = row.get(name) {
                    if self.is_null(raw) {
                        // An absent column value may still have a context
                        // default under the target field's name.
                        return Ok(context
                            .get(field_name)
                            .filter(|v| !self.is_null(v))
                            .map(|v| Value::String(v.clone())));
                    }
                    return Ok(Some(Value::String(raw.clone())));
                }
                Ok(Some(Value::String(name.clone())))
            },
            FieldConfig::Bool(flag) => Ok(Some(Value::Bool(*flag))),
            FieldConfig::Number(number) => Ok(Some(
                serde_json::Number::from_f64(*number).map_or(Value::Null, Value::Number),
            )),
            FieldConfig::Rule(rule) => self.eval_rule(rule, row, context, field_name),
        }
    }

    fn eval_rule(
        &self,
        rule: &MappingRule,
        row: &TableRow,
        context: &BTreeMap<String, String>,
        field_name: &str,
    ) -> Result<Option<Value>, MappingError> {
        let mut value: Option<Value> = if let Some(literal) = &rule.literal {
            Some(literal.clone())
        } else if let Some(reference) = &rule.reference {
            // Unpopulated references (including cycles) resolve to null.
            context.get(reference).map(|v| Value::String(v.clone()))
        } else if let Some(template) = &rule.template {
            Some(Value::String(substitute_template(template, context)))
        } else if let Some(source) = &rule.source {
            row.get(source).filter(|raw| !self.is_null(raw)).map(|raw| Value::String(raw.clone()))
        } else {
            None
        };

        // Transforms see the resolved JSON value directly, so an array (a
        // list literal, or a future chained `split`) reaches `join` as
        // joinable data rather than its stringified form.
        if let (Some(transform), Some(current)) = (&rule.transform, &value) {
            value = Some(apply_transformation(current, transform)?);
        }

        let is_empty = value.as_ref().is_none_or(|v| match v {
            Value::Null => true,
            Value::String(text) => self.is_null(text),
            _ => false,
        });
        if is_empty {
            if let Some(default) = &rule.default {
                return Ok(Some(default.clone()));
            }
            if rule.required {
                return Err(MappingError::MissingRequired(field_name.to_string()));
            }
            return Ok(None);
        }
        Ok(value)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn value_to_string_ref(value: &Value) -> Option<String> {
    value_to_string(value)
}

/// Evaluate a membership guard expression.
///
/// Supports `{var} != "value"`, `{var} == "value"`, and bare truthiness of
/// the substituted expression.
fn evaluate_condition(condition: &str, context: &BTreeMap<String, String>) -> bool {
    let evaluated = substitute_template(condition, context);

    fn unquote(side: &str) -> &str {
        side.trim().trim_matches('"').trim_matches('\'')
    }
    if let Some((left, right)) = evaluated.split_once(" != ") {
        return unquote(left) != unquote(right);
    }
    if let Some((left, right)) = evaluated.split_once(" == ") {
        return unquote(left) == unquote(right);
    }
    !evaluated.trim().is_empty()
}

/// Parse simple CSV text into table rows.
///
/// Handles quoted fields with doubled-quote escapes; the first line is the
/// header. Not a general CSV implementation — campus exports are regular.
#[must_use]
pub fn parse_csv_text(text: &str, delimiter: char) -> Vec<TableRow> {
    fn split_line(line: &str, delimiter: char) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if in_quotes {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    current.push(c);
                }
            } else if c == '"' {
                in_quotes = true;
            } else if c == delimiter {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        fields.push(current);
        fields
    }

    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers = split_line(header_line, delimiter);

    lines
        .map(|line| {
            let values = split_line(line, delimiter);
            headers
                .iter()
                .zip(values.into_iter().chain(std::iter::repeat(String::new())))
                .map(|(header, value)| (header.trim().to_string(), value))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mapper() -> DeploymentMapper {
        DeploymentMapper::from_json(&json!({
            "user_fields": {
                "given_name": "First Name",
                "family_name": "Last Name",
                "email": "Email",
                "username": {"template": "{email}", "transform": "extract_username"},
                "number": "Student ID"
            },
            "account_fields": {
                "provider": {"literal": "gitlab"},
                "type": {"literal": "oauth"},
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
        .expect("valid config")
    }

    fn row(pairs: &[(&str, &str)]) -> TableRow {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_three_row_mapping_is_deterministic() {
        let mapper = mapper();
        let rows = vec![
            row(&[
                ("First Name", "Ada"),
                ("Last Name", "Lovelace"),
                ("Email", "Ada.Lovelace@example.org"),
                ("Student ID", "1001"),
                ("Group", "A"),
            ]),
            row(&[
                ("First Name", "Alan"),
                ("Last Name", "Turing"),
                ("Email", "Alan.Turing@example.org"),
                ("Student ID", "1002"),
                ("Group", ""),
            ]),
            row(&[
                ("First Name", "Grace"),
                ("Last Name", "Hopper"),
                ("Email", "Grace.Hopper@example.org"),
                ("Student ID", "1003"),
                ("Group", "B"),
            ]),
        ];

        let config = mapper.map_rows(&rows).expect("mapping succeeds");
        assert_eq!(config.users.len(), 3);

        // Usernames come from the email local part.
        assert_eq!(config.users[0].user.username.as_deref(), Some("Ada.Lovelace"));

        // Memberships exist exactly where Group is nonempty.
        assert_eq!(config.users[0].course_members.len(), 1);
        assert_eq!(config.users[1].course_members.len(), 0);
        assert_eq!(config.users[2].course_members.len(), 1);
        assert_eq!(config.users[2].course_members[0].group.as_deref(), Some("B"));
        assert_eq!(config.users[0].course_members[0].role, "_student");

        // Accounts reference the computed username.
        assert_eq!(
            config.users[1].accounts[0].provider_account_id.as_deref(),
            Some("Alan.Turing")
        );

        // Determinism: mapping twice yields identical output.
        let again = mapper.map_rows(&rows).expect("mapping succeeds");
        assert_eq!(config, again);
    }

    #[test]
    fn test_lowercased_usernames_via_chained_transform() {
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {
                "email": {"source": "Email", "transform": "to_lower"},
                "username": {"template": "{email}", "transform": "extract_username"}
            }
        }))
        .expect("valid config");

        let config = mapper
            .map_rows(&[row(&[("Email", "John.Doe@Example.COM")])])
            .expect("mapping succeeds");
        assert_eq!(config.users[0].user.email.as_deref(), Some("john.doe@example.com"));
        assert_eq!(config.users[0].user.username.as_deref(), Some("john.doe"));
    }

    #[test]
    fn test_join_transform_receives_list_literals_intact() {
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {
                "password": {"literal": ["alpha", "beta"], "transform": "join"}
            }
        }))
        .expect("valid config");

        let config = mapper.map_rows(&[row(&[])]).expect("mapping succeeds");
        assert_eq!(config.users[0].user.password.as_deref(), Some("alpha,beta"));
    }

    #[test]
    fn test_forward_reference_resolves_to_null() {
        // username references password, which is computed later: the ref
        // sees an unpopulated key and yields null (cycle rule).
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {
                "username": {"ref": "password"},
                "password": {"literal": "secret"}
            }
        }))
        .expect("valid config");

        let config = mapper.map_rows(&[row(&[])]).expect("mapping succeeds");
        assert_eq!(config.users[0].user.username, None);
        assert_eq!(config.users[0].user.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_required_field_failure_is_collected_per_row() {
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {
                "email": {"source": "Email", "required": true}
            }
        }))
        .expect("valid config");

        let rows = vec![row(&[("Email", "a@example.org")]), row(&[("Email", "")])];
        let err = mapper.map_rows(&rows).expect_err("row 2 fails");
        match err {
            MappingError::Rows(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("Row 2:"));
            },
            other => panic!("expected row errors, got {other}"),
        }
    }

    #[test]
    fn test_multiple_memberships_with_conditions() {
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {"email": "Email"},
            "course_member_fields": [
                {
                    "organization": {"literal": "kit"},
                    "course_family": {"literal": "prog"},
                    "course": {"literal": "prog1"},
                    "condition": "{Track} == \"beginner\""
                },
                {
                    "organization": {"literal": "kit"},
                    "course_family": {"literal": "prog"},
                    "course": {"literal": "prog2"},
                    "condition": "{Track} == \"advanced\""
                }
            ]
        }))
        .expect("valid config");

        let config = mapper
            .map_rows(&[row(&[("Email", "x@example.org"), ("Track", "advanced")])])
            .expect("mapping succeeds");
        assert_eq!(config.users[0].course_members.len(), 1);
        assert_eq!(config.users[0].course_members[0].course.as_deref(), Some("prog2"));
    }

    #[test]
    fn test_default_values_fill_missing_columns() {
        let mapper = DeploymentMapper::from_json(&json!({
            "user_fields": {"user_type": "user_type_column"},
            "transformations": {"default_values": {"user_type_column": "token"}}
        }))
        .expect("valid config");

        // No such column in the row: the literal fallback is the column name,
        // so provide the column with an empty value to hit the default path.
        let config = mapper
            .map_rows(&[row(&[("user_type_column", "")])])
            .expect("mapping succeeds");
        // Empty column + no context default under the *field* name: falls
        // back to the built-in "user".
        assert_eq!(config.users[0].user.user_type.as_deref(), Some("user"));
    }

    #[test]
    fn test_parse_csv_text_with_quotes() {
        let rows = parse_csv_text(
            "Name,Email\n\"Doe, John\",john@example.org\nJane,jane@example.org\n",
            ',',
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name"], "Doe, John");
        assert_eq!(rows[1]["Email"], "jane@example.org");
    }

    #[test]
    fn test_parse_csv_text_pads_short_rows() {
        let rows = parse_csv_text("a,b,c\n1,2\n", ',');
        assert_eq!(rows[0]["c"], "");
    }
}
