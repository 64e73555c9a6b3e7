//! Error types for shutter operations

use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid store key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Durable store I/O failed for {key}: {reason}")]
    Io { key: String, reason: String },
}

impl StoreError {
    /// Whether the store reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Origin fetch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("Origin image not found: {path}")]
    NotFound { path: String },

    #[error("Origin unavailable for {path}: {reason}")]
    Unavailable { path: String, reason: String },
}

/// Upstream transformer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The transformer refused the input (4xx). Permanent for this input.
    #[error("Transformer rejected input with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transformer unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Tiered cache errors.
///
/// Only the read side ever reaches a caller of the pipeline; write failures are
/// logged and swallowed once a fresh artifact exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache read failed: {0}")]
    Read(StoreError),

    #[error("Cache write failed: {0}")]
    Write(StoreError),
}

/// Request validation errors raised before the pipeline runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid size format '{input}', expected W or WxH")]
    InvalidSize { input: String },

    #[error("Size {size} is not allowed")]
    SizeNotAllowed { size: String },

    #[error("Path {path} is blocked, please use '{hint}' instead")]
    BlockedPath { path: String, hint: String },

    #[error("Image path is empty")]
    EmptyPath,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse failure class used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotFound,
    Unavailable,
    Rejected,
    Cancelled,
}

impl FailureKind {
    /// Stable lowercase label, used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Rejected => "rejected",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Errors surfaced by the transform pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("Request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Classify the error into the failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Origin(OriginError::NotFound { .. }) => FailureKind::NotFound,
            PipelineError::Origin(OriginError::Unavailable { .. }) => FailureKind::Unavailable,
            PipelineError::Transform(TransformError::Rejected { .. }) => FailureKind::Rejected,
            PipelineError::Transform(TransformError::Unavailable { .. }) => {
                FailureKind::Unavailable
            }
            PipelineError::Cache(_) => FailureKind::Unavailable,
            PipelineError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Master error type for all shutter errors.
#[derive(Debug, Clone, Error)]
pub enum ShutterError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for shutter operations.
pub type ShutterResult<T> = Result<T, ShutterError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_kinds() {
        let not_found = PipelineError::from(OriginError::NotFound {
            path: "pic/a.jpg".to_string(),
        });
        assert_eq!(not_found.kind(), FailureKind::NotFound);

        let origin_down = PipelineError::from(OriginError::Unavailable {
            path: "pic/a.jpg".to_string(),
            reason: "connection refused".to_string(),
        });
        assert_eq!(origin_down.kind(), FailureKind::Unavailable);

        let rejected = PipelineError::from(TransformError::Rejected {
            status: 400,
            message: "not an image".to_string(),
        });
        assert_eq!(rejected.kind(), FailureKind::Rejected);

        let upstream_down = PipelineError::from(TransformError::Unavailable {
            reason: "502".to_string(),
        });
        assert_eq!(upstream_down.kind(), FailureKind::Unavailable);

        let read = PipelineError::from(CacheError::Read(StoreError::Unavailable {
            reason: "timeout".to_string(),
        }));
        assert_eq!(read.kind(), FailureKind::Unavailable);

        assert_eq!(PipelineError::Cancelled.kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_store_error_not_found() {
        let err = StoreError::NotFound {
            key: "/pic/a.jpg@200x0".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/pic/a.jpg@200x0"));

        let err = StoreError::Unavailable {
            reason: "503".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_validation_error_display_blocked_path() {
        let err = ValidationError::BlockedPath {
            path: "pic/cover/c/a.jpg".to_string(),
            hint: "/r/<size>/pic/cover/l/".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pic/cover/c/a.jpg"));
        assert!(msg.contains("/r/<size>/pic/cover/l/"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "SHUTTER_CACHE_COST".to_string(),
            value: "pages".to_string(),
            reason: "expected entries or bytes".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("SHUTTER_CACHE_COST"));
        assert!(msg.contains("pages"));
    }

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(FailureKind::NotFound.as_str(), "not_found");
        assert_eq!(FailureKind::Cancelled.as_str(), "cancelled");
    }
}
