//! Cache-internal error type.
//!
//! `CacheError` never crosses the crate boundary as an `Err`: the public
//! [`crate::Cache`] API catches every backend failure, logs it, and degrades
//! to a miss or a skipped store. The type exists so backends have a uniform
//! fallible signature.

// Error variants are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

/// Errors raised by cache backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
