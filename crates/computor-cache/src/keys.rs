//! Cache key hashing.
//!
//! # Security Critical
//!
//! Parameter hashes are part of cache keys. Two semantically different filter
//! sets MUST hash differently, or one user's filtered projection could be
//! served for another filter. Both hashes below are computed over the
//! canonical sorted-key JSON form, so field order never changes the key.

use serde::Serialize;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Stable hash for composite cache-key components.
///
/// Serializes the value to canonical JSON (object keys sorted) and takes the
/// SHA-1 hex digest. Used wherever an identifier is not a plain scalar:
/// composite entity ids, versioned-key composition. SHA-1 is fine here — the
/// digest only names a cache entry, nothing verifies it.
///
/// # Example
///
/// ```
/// use computor_cache::stable_key;
/// use serde_json::json;
///
/// let a = stable_key(&json!({"b": 1, "a": 2}));
/// let b = stable_key(&json!({"a": 2, "b": 1}));
/// assert_eq!(a, b);
/// ```
#[must_use]
pub fn stable_key<T: Serialize>(value: &T) -> String {
    let raw = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash query parameters into a short, stable cache-key component.
///
/// `None`/null fields are stripped before hashing so that explicitly-unset and
/// omitted filters share one cache entry. Empty parameter sets hash to the
/// literal `"default"`. The digest is SHA-256 truncated to 16 hex characters.
///
/// # Example
///
/// ```
/// use computor_cache::params_hash;
/// use serde_json::json;
///
/// assert_eq!(params_hash(&json!({})), "default");
/// assert_eq!(params_hash(&json!({"course_id": null})), "default");
/// assert_eq!(params_hash(&json!({"course_id": "c1"})).len(), 16);
/// ```
#[must_use]
pub fn params_hash<T: Serialize>(params: &T) -> String {
    let Ok(value) = serde_json::to_value(params) else {
        return "default".to_string();
    };
    let stripped = strip_nulls(value);

    let empty = match &stripped {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if empty {
        return "default".to_string();
    }

    let raw = serde_json::to_string(&stripped).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stable_key_is_deterministic() {
        let a = stable_key(&json!({"course_id": "c1", "limit": 10}));
        let b = stable_key(&json!({"course_id": "c1", "limit": 10}));
        assert_eq!(a, b);
        // SHA-1 hex digest.
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stable_key_ignores_field_order() {
        // serde_json maps are sorted, so insertion order cannot leak into keys.
        let a = stable_key(&json!({"x": 1, "y": 2}));
        let b = stable_key(&json!({"y": 2, "x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_params_produce_different_hashes() {
        let a = params_hash(&json!({"course_id": "c1"}));
        let b = params_hash(&json!({"course_id": "c2"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_fields_do_not_change_hash() {
        let a = params_hash(&json!({"course_id": "c1", "path": null}));
        let b = params_hash(&json!({"course_id": "c1"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_params_hash_to_default() {
        assert_eq!(params_hash(&json!({})), "default");
        assert_eq!(params_hash(&json!(null)), "default");
    }

    #[test]
    fn test_params_hash_length() {
        let hash = params_hash(&json!({"course_id": "c1", "limit": 10, "skip": 0}));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
