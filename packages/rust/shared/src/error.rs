//! Error types for BrandGraph.
//!
//! Library crates use [`BrandGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Hard failures live here. Lookups that may legitimately miss (status
//! updates, generation completion) return an [`Outcome`](crate::Outcome)
//! instead, so repeated calls stay safe.

use std::path::PathBuf;

/// Top-level error type for all BrandGraph operations.
#[derive(Debug, thiserror::Error)]
pub enum BrandGraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Payload parsed but carried bad values (unknown enum, retired status, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Ingestion payload did not match any accepted shape.
    #[error("malformed payload: expected an array of records, found {observed}")]
    MalformedPayload { observed: String },

    /// A parent entity the operation depends on does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A natural key is already owned by a different entity.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BrandGraphError>;

impl BrandGraphError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-payload error naming the observed structure.
    pub fn malformed(observed: impl Into<String>) -> Self {
        Self::MalformedPayload {
            observed: observed.into(),
        }
    }

    /// Create a hard not-found error.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Create a conflict error from any displayable message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
