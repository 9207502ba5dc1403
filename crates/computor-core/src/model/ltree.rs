//! Labeled tree paths.
//!
//! Dotted hierarchical identifiers (e.g. `itp.py.hello`) with equality,
//! prefix, and descendant-of relations. Used both for course-content
//! structure and for example identifiers. Stored in PostgreSQL as `ltree`;
//! this type round-trips through the textual form.

use std::fmt;
use std::str::FromStr;

use computor_error::CoreError;
use serde::{Deserialize, Serialize};

/// A labeled tree path: dot-separated labels of `[A-Za-z0-9_]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ltree(String);

impl Ltree {
    /// Parse a path, validating the label grammar.
    pub fn new(path: impl Into<String>) -> Result<Self, CoreError> {
        let path = path.into();
        let valid = !path.is_empty()
            && path.split('.').all(|label| {
                !label.is_empty()
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(CoreError::validation(format!("invalid ltree path: {path:?}")));
        }
        Ok(Self(path))
    }

    /// The textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of labels (PostgreSQL `nlevel`).
    #[must_use]
    pub fn nlevel(&self) -> usize {
        self.0.split('.').count()
    }

    /// The first `n` labels (PostgreSQL `subpath(path, 0, n)`).
    ///
    /// `n` is clamped to the path length.
    #[must_use]
    pub fn subpath(&self, n: usize) -> Self {
        let prefix: Vec<&str> = self.0.split('.').take(n.max(1)).collect();
        Self(prefix.join("."))
    }

    /// Whether `self` is `prefix` or below it (PostgreSQL `self <@ prefix`).
    #[must_use]
    pub fn is_descendant_of(&self, prefix: &Self) -> bool {
        self == prefix || self.0.starts_with(format!("{}.", prefix.0).as_str())
    }

    /// Every proper and improper prefix of this path, shortest first.
    #[must_use]
    pub fn prefixes(&self) -> Vec<Self> {
        let labels: Vec<&str> = self.0.split('.').collect();
        (1..=labels.len()).map(|n| Self(labels[..n].join("."))).collect()
    }
}

impl fmt::Display for Ltree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ltree {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths_parse() {
        assert!(Ltree::new("w1").is_ok());
        assert!(Ltree::new("itp.py.hello").is_ok());
        assert!(Ltree::new("a_1.b_2").is_ok());
    }

    #[test]
    fn test_invalid_paths_rejected() {
        assert!(Ltree::new("").is_err());
        assert!(Ltree::new(".a").is_err());
        assert!(Ltree::new("a..b").is_err());
        assert!(Ltree::new("a.b-c").is_err());
    }

    #[test]
    fn test_nlevel_and_subpath() {
        let path = Ltree::new("w1.a.x").expect("valid path");
        assert_eq!(path.nlevel(), 3);
        assert_eq!(path.subpath(1).as_str(), "w1");
        assert_eq!(path.subpath(2).as_str(), "w1.a");
        assert_eq!(path.subpath(9).as_str(), "w1.a.x");
    }

    #[test]
    fn test_descendant_of() {
        let root = Ltree::new("w1").expect("valid path");
        let child = Ltree::new("w1.a").expect("valid path");
        let other = Ltree::new("w10.a").expect("valid path");

        assert!(child.is_descendant_of(&root));
        assert!(root.is_descendant_of(&root));
        // Label boundaries matter: w10.a is not under w1.
        assert!(!other.is_descendant_of(&root));
        assert!(!root.is_descendant_of(&child));
    }

    #[test]
    fn test_prefixes() {
        let path = Ltree::new("w1.a.x").expect("valid path");
        let prefixes: Vec<String> =
            path.prefixes().into_iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(prefixes, vec!["w1", "w1.a", "w1.a.x"]);
    }

    #[test]
    fn test_serde_is_transparent() {
        let path = Ltree::new("itp.py.hello").expect("valid path");
        let json = serde_json::to_string(&path).expect("serialize");
        assert_eq!(json, "\"itp.py.hello\"");
        let back: Ltree = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, path);
    }
}
