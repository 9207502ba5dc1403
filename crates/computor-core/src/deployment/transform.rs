//! Field value transformations.

use serde_json::Value;

use super::MappingError;

/// Substitute `{var}` placeholders from the context, left to right.
///
/// Unknown placeholders are left intact; null context values substitute as
/// empty strings.
#[must_use]
pub fn substitute_template(template: &str, context: &std::collections::BTreeMap<String, String>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let mut result = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{key}}}");
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, value);
        }
    }
    result
}

/// Textual form of a scalar value; arrays join their element texts.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => {
            items.iter().map(text_of).collect::<Vec<_>>().join(",")
        },
        other => other.to_string(),
    }
}

fn extract_username(value: &str) -> String {
    value.split('@').next().unwrap_or(value).to_string()
}

fn to_bool(value: &str) -> bool {
    let normalized = value.to_lowercase();
    let normalized = normalized.trim();
    matches!(normalized, "true" | "yes" | "y" | "1" | "on")
}

fn normalize_path(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    let mut normalized = String::with_capacity(trimmed.len());
    let mut previous_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if !previous_slash {
                normalized.push('/');
            }
            previous_slash = true;
        } else {
            normalized.push(c);
            previous_slash = false;
        }
    }
    normalized
}

/// Apply a named transformation to a resolved field value.
///
/// Takes the value as JSON so list-producing transforms compose: an array
/// (from a list literal or a `split`) reaches `join` intact instead of being
/// flattened through its `Display` form. Numeric and boolean transforms
/// return typed values; string transforms return strings.
pub fn apply_transformation(value: &Value, name: &str) -> Result<Value, MappingError> {
    if name == "join" {
        let joined = match value {
            Value::Array(items) => {
                items.iter().map(text_of).collect::<Vec<_>>().join(",")
            },
            other => text_of(other),
        };
        return Ok(Value::String(joined));
    }

    let text = text_of(value);
    let text = text.as_str();
    match name {
        "extract_username" => Ok(Value::String(extract_username(text))),
        "to_lower" => Ok(Value::String(text.to_lowercase())),
        "to_upper" => Ok(Value::String(text.to_uppercase())),
        "strip" => Ok(Value::String(text.trim().to_string())),
        "to_bool" => Ok(Value::Bool(to_bool(text))),
        "to_int" => {
            let parsed = text.trim().parse::<f64>().ok();
            #[allow(clippy::cast_possible_truncation)]
            let result = parsed.map_or(Value::Null, |f| Value::from(f.trunc() as i64));
            Ok(result)
        },
        "to_float" => {
            Ok(text.trim().parse::<f64>().ok().map(Value::from).unwrap_or(Value::Null))
        },
        "split" => Ok(Value::Array(
            text.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .filter(|part| part.as_str().is_some_and(|s| !s.is_empty()))
                .collect(),
        )),
        "normalize_path" => Ok(Value::String(normalize_path(text))),
        "extract_path_parts" => Ok(Value::Array(
            normalize_path(text)
                .split('/')
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        other => Err(MappingError::UnknownTransformation(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn context(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_template_substitution() {
        let ctx = context(&[("first", "john"), ("last", "doe")]);
        assert_eq!(substitute_template("{first}_{last}", &ctx), "john_doe");
        assert_eq!(substitute_template("no placeholders", &ctx), "no placeholders");
        // Unknown variables stay as-is.
        assert_eq!(substitute_template("{unknown}", &ctx), "{unknown}");
    }

    #[test]
    fn test_extract_username() {
        assert_eq!(
            apply_transformation(&json!("John.Doe@example.com"), "extract_username")
                .expect("transform"),
            Value::String("John.Doe".to_string())
        );
        assert_eq!(
            apply_transformation(&json!("no-at-sign"), "extract_username").expect("transform"),
            Value::String("no-at-sign".to_string())
        );
    }

    #[test]
    fn test_to_bool_values() {
        for truthy in ["true", "Yes", "y", "1", "on"] {
            assert_eq!(
                apply_transformation(&json!(truthy), "to_bool").expect("transform"),
                Value::Bool(true),
                "{truthy} should be true"
            );
        }
        for falsy in ["false", "no", "0", "off", ""] {
            assert_eq!(
                apply_transformation(&json!(falsy), "to_bool").expect("transform"),
                Value::Bool(false),
                "{falsy:?} should be false"
            );
        }
    }

    #[test]
    fn test_numeric_transforms() {
        assert_eq!(
            apply_transformation(&json!("42"), "to_int").expect("transform"),
            Value::from(42)
        );
        assert_eq!(
            apply_transformation(&json!("4.5"), "to_int").expect("transform"),
            Value::from(4)
        );
        assert_eq!(
            apply_transformation(&json!("oops"), "to_int").expect("transform"),
            Value::Null
        );
        assert_eq!(
            apply_transformation(&json!("0.5"), "to_float").expect("transform"),
            Value::from(0.5)
        );
    }

    #[test]
    fn test_split_trims_and_drops_empties() {
        assert_eq!(
            apply_transformation(&json!("a, b,, c"), "split").expect("transform"),
            json!(["a", "b", "c"])
        );
    }

    #[test]
    fn test_join_flattens_arrays() {
        assert_eq!(
            apply_transformation(&json!(["a", "b", "c"]), "join").expect("transform"),
            Value::String("a,b,c".to_string())
        );
        // Scalars pass through as their text form.
        assert_eq!(
            apply_transformation(&json!("already-flat"), "join").expect("transform"),
            Value::String("already-flat".to_string())
        );
    }

    #[test]
    fn test_split_then_join_roundtrip() {
        let split = apply_transformation(&json!("a, b, c"), "split").expect("split");
        let joined = apply_transformation(&split, "join").expect("join");
        assert_eq!(joined, Value::String("a,b,c".to_string()));
    }

    #[test]
    fn test_path_transforms() {
        assert_eq!(
            apply_transformation(&json!("/kit//prog/prog1/"), "normalize_path")
                .expect("transform"),
            Value::String("kit/prog/prog1".to_string())
        );
        assert_eq!(
            apply_transformation(&json!("kit/prog/prog1"), "extract_path_parts")
                .expect("transform"),
            json!(["kit", "prog", "prog1"])
        );
    }

    #[test]
    fn test_unknown_transformation_errors() {
        assert!(matches!(
            apply_transformation(&json!("x"), "frobnicate"),
            Err(MappingError::UnknownTransformation(_))
        ));
    }
}
