//! Unified error types for the Computor coherency core.
//!
//! All runtime crates depend on this crate for error handling. The taxonomy is
//! semantic, not syntactic: each variant encodes how the error propagates, not
//! where it was raised. Cache failures are deliberately *absent* — the cache
//! layer swallows its own errors and downgrades to bypass mode, so they never
//! reach callers.

// Error variants and fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::error::Error as StdError;

/// Unified error type for store access, repositories, and view queries.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Permission denied: {detail}")]
    PermissionDenied { detail: String },

    #[error("Conflict: {detail}")]
    Conflict { detail: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("Store unavailable: {reason}")]
    StoreUnavailable {
        reason:      String,
        retry_after: Option<u64>,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source:  Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl CoreError {
    /// Get the stable error code for this error.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Conflict { .. } => "conflict",
            Self::Validation { .. } => "validation_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::Database(_) => "database_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether a caller may retry the failed operation.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::RateLimited { .. } | Self::StoreUnavailable { .. }
        )
    }

    /// Shorthand for a [`CoreError::NotFound`] with the given resource label.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for an opaque [`CoreError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source:  None,
        }
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(CoreError::not_found("course").error_code(), "not_found");
        assert_eq!(CoreError::validation("bad path").error_code(), "validation_error");
        assert_eq!(
            CoreError::StoreUnavailable {
                reason:      "pool exhausted".to_string(),
                retry_after: Some(2),
            }
            .error_code(),
            "store_unavailable"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::StoreUnavailable {
            reason:      "timeout".to_string(),
            retry_after: None,
        }
        .is_retryable());
        assert!(CoreError::Conflict {
            detail: "duplicate key".to_string(),
        }
        .is_retryable());
        assert!(!CoreError::not_found("grade").is_retryable());
        assert!(!CoreError::validation("grade out of range").is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = CoreError::PermissionDenied {
            detail: "tutor role required".to_string(),
        };
        assert!(err.to_string().contains("tutor role required"));
    }
}
