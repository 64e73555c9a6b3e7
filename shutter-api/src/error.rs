//! Error Types for shutter API
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shutter_core::{
    CacheError, ConfigError, OriginError, PipelineError, ShutterError, StoreError,
    TransformError, ValidationError,
};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur while serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Size parameter is not `W` or `WxH`
    InvalidSize,

    /// Size parameter parses but is outside the allowed set
    SizeNotAllowed,

    /// Path is not servable through this proxy
    BlockedPath,

    /// Request contains invalid input data
    InvalidInput,

    /// The transformer refused the source image
    TransformRejected,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Source image does not exist at the origin
    ImageNotFound,

    // ========================================================================
    // Server Errors (500, 502, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Reading the durable cache failed
    CacheReadFailed,

    /// Configuration is invalid
    ConfigInvalid,

    /// Origin or transformer unreachable or failing
    UpstreamUnavailable,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Operation timed out or was cancelled
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidSize
            | ErrorCode::SizeNotAllowed
            | ErrorCode::BlockedPath
            | ErrorCode::InvalidInput
            | ErrorCode::TransformRejected => StatusCode::BAD_REQUEST,

            ErrorCode::ImageNotFound => StatusCode::NOT_FOUND,

            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::CacheReadFailed | ErrorCode::ConfigInvalid => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSize => "Invalid size format",
            ErrorCode::SizeNotAllowed => "Size is not allowed",
            ErrorCode::BlockedPath => "Path is not allowed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::TransformRejected => "Image could not be transformed",
            ErrorCode::ImageNotFound => "Image not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::CacheReadFailed => "Failed to read cached image",
            ErrorCode::ConfigInvalid => "Invalid configuration",
            ErrorCode::UpstreamUnavailable => "Upstream service unavailable",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an ImageNotFound error.
    pub fn image_not_found(path: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ImageNotFound, format!("Image {} not found", path))
    }

    /// Create an UpstreamUnavailable error.
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling in Axum.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::InvalidSize { .. } => ApiError::new(ErrorCode::InvalidSize, message),
            ValidationError::SizeNotAllowed { .. } => {
                ApiError::new(ErrorCode::SizeNotAllowed, message)
            }
            ValidationError::BlockedPath { hint, .. } => {
                ApiError::new(ErrorCode::BlockedPath, message)
                    .with_details(serde_json::json!({ "hint": hint }))
            }
            ValidationError::EmptyPath => ApiError::invalid_input(message),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Origin(OriginError::NotFound { path }) => ApiError::image_not_found(path),
            PipelineError::Origin(e @ OriginError::Unavailable { .. }) => {
                ApiError::upstream_unavailable(e.to_string())
            }
            PipelineError::Transform(e @ TransformError::Rejected { .. }) => {
                ApiError::new(ErrorCode::TransformRejected, e.to_string())
            }
            PipelineError::Transform(e @ TransformError::Unavailable { .. }) => {
                ApiError::upstream_unavailable(e.to_string())
            }
            PipelineError::Cache(e) => {
                // Store details stay in the logs
                tracing::error!(error = %e, "Cache read failed");
                match e {
                    CacheError::Read(_) => ApiError::from_code(ErrorCode::CacheReadFailed),
                    CacheError::Write(_) => ApiError::internal_error("Failed to store image"),
                }
            }
            PipelineError::Cancelled => ApiError::timeout("resize"),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigInvalid, err.to_string())
    }
}

impl From<ShutterError> for ApiError {
    fn from(err: ShutterError) -> Self {
        match err {
            ShutterError::Store(e) => e.into(),
            ShutterError::Pipeline(e) => e.into(),
            ShutterError::Validation(e) => e.into(),
            ShutterError::Config(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Durable store error");
        ApiError::service_unavailable(format!("Durable store error: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
