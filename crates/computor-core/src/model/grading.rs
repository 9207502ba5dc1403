//! Grading status codes.

use serde::{Deserialize, Serialize};

/// Grading status of a submission grade.
///
/// Stored as a small integer; exposed to clients as the string form. The
/// string values are part of the projection DTO contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingStatus {
    /// No reviewer has looked at the submission yet.
    NotReviewed,
    /// Reviewed and accepted.
    Corrected,
    /// Reviewed; the student must correct and resubmit.
    CorrectionNecessary,
    /// Reviewed; acceptable, but improvement is possible.
    ImprovementPossible,
}

impl GradingStatus {
    /// Decode the stored integer form. Unknown codes read as `NotReviewed`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Corrected,
            2 => Self::CorrectionNecessary,
            3 => Self::ImprovementPossible,
            _ => Self::NotReviewed,
        }
    }

    /// The stored integer form.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NotReviewed => 0,
            Self::Corrected => 1,
            Self::CorrectionNecessary => 2,
            Self::ImprovementPossible => 3,
        }
    }

    /// The wire string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReviewed => "not_reviewed",
            Self::Corrected => "corrected",
            Self::CorrectionNecessary => "correction_necessary",
            Self::ImprovementPossible => "improvement_possible",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in 0..4 {
            assert_eq!(GradingStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_codes_read_as_not_reviewed() {
        assert_eq!(GradingStatus::from_code(-1), GradingStatus::NotReviewed);
        assert_eq!(GradingStatus::from_code(99), GradingStatus::NotReviewed);
    }

    #[test]
    fn test_wire_strings_are_stable() {
        assert_eq!(GradingStatus::NotReviewed.as_str(), "not_reviewed");
        assert_eq!(GradingStatus::Corrected.as_str(), "corrected");
        assert_eq!(GradingStatus::CorrectionNecessary.as_str(), "correction_necessary");
        assert_eq!(GradingStatus::ImprovementPossible.as_str(), "improvement_possible");
    }

    #[test]
    fn test_serde_uses_snake_case_strings() {
        let json = serde_json::to_string(&GradingStatus::CorrectionNecessary).expect("serialize");
        assert_eq!(json, "\"correction_necessary\"");
    }
}
