//! Error Types for the HackHub API layer
//!
//! `ApiError` is what a handler returns; `ErrorCode` fixes its HTTP status.
//!
//! Data-layer failures arrive as [`DataError`] and are converted once. Server
//! side kinds lose their message and detail on the way out; both are logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hackhub_core::{DataError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Wire-level error code, serialized in screaming snake case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request carries no usable identity
    Unauthorized,

    /// Caller lacks the capability for the operation
    Forbidden,

    // ========================================================================
    // Client Errors (400)
    // ========================================================================
    /// Entity failed its schema check
    ValidationFailed,

    /// Entity references a row that does not exist
    DependencyMissing,

    /// Entity is still referenced by another row
    ReferencedElsewhere,

    /// A required column was null
    NullConstraint,

    // ========================================================================
    // Not Found / Conflict (404, 409)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Entity with the same key already exists
    EntityAlreadyExists,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// HTTP status sent with this code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::DependencyMissing
            | ErrorCode::ReferencedElsewhere
            | ErrorCode::NullConstraint => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::EntityAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when the caller supplies none.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Insufficient permissions for this operation",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::DependencyMissing => "Object depends on a non-existent dependency",
            ErrorCode::ReferencedElsewhere => "Cannot delete as this object is referenced elsewhere",
            ErrorCode::NullConstraint => "A required property was found to be null",
            ErrorCode::EntityNotFound => "No data was found for this query",
            ErrorCode::EntityAlreadyExists => "Duplicate objects not allowed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::ValidationFailed,
            ErrorKind::Duplicate => ErrorCode::EntityAlreadyExists,
            ErrorKind::DependencyMissing => ErrorCode::DependencyMissing,
            ErrorKind::ReferencedElsewhere => ErrorCode::ReferencedElsewhere,
            ErrorKind::NullConstraint => ErrorCode::NullConstraint,
            ErrorKind::NotFound => ErrorCode::EntityNotFound,
            ErrorKind::Forbidden => ErrorCode::Forbidden,
            ErrorKind::MalformedStatement | ErrorKind::Unavailable | ErrorKind::Unknown => {
                ErrorCode::InternalError
            }
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

/// JSON body of every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Decides the HTTP status
    pub code: ErrorCode,

    /// Safe to show to the caller
    pub message: String,

    /// Individual schema violations for VALIDATION_FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Error carrying the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Authorization denial. Never names the capability that was checked.
    pub fn forbidden() -> Self {
        Self::from_code(ErrorCode::Forbidden)
    }

    /// Generic 500. Details belong in the log, not the response.
    pub fn internal_error() -> Self {
        Self::from_code(ErrorCode::InternalError)
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

/// Allows ApiError to be returned directly from Axum handlers:
/// ```ignore
/// async fn handler() -> Result<Json<Project>, ApiError> {
///     Err(ApiError::forbidden())
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        let code = ErrorCode::from(err.kind);
        if !err.kind.is_client_error() {
            tracing::error!(
                kind = %err.kind,
                message = %err.message,
                detail = err.detail.as_deref().unwrap_or(""),
                "data operation failed"
            );
            return ApiError::internal_error();
        }
        if let Some(detail) = &err.detail {
            tracing::debug!(kind = %err.kind, detail = %detail, "client error");
        }
        match err.kind {
            ErrorKind::Forbidden => ApiError::forbidden(),
            ErrorKind::Validation => {
                let violations: Vec<&str> = err.message.split("; ").collect();
                let details = serde_json::json!(violations);
                ApiError {
                    details: Some(details),
                    ..ApiError::new(code, err.message.clone())
                }
            }
            _ => ApiError::new(code, err.message),
        }
    }
}

/// Result of a request handler.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_agrees_with_kind() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::Duplicate,
            ErrorKind::DependencyMissing,
            ErrorKind::ReferencedElsewhere,
            ErrorKind::NullConstraint,
            ErrorKind::NotFound,
            ErrorKind::MalformedStatement,
            ErrorKind::Unavailable,
            ErrorKind::Forbidden,
            ErrorKind::Unknown,
        ];
        for kind in kinds {
            assert_eq!(ErrorCode::from(kind).status_code().as_u16(), kind.status_code());
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = DataError::new(ErrorKind::MalformedStatement, "syntax error at or near \"FORM\"")
            .with_detail("SQLSTATE 42601");
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::InternalError);
        assert_eq!(api.message, "Internal server error");
        assert!(api.details.is_none());
    }

    #[test]
    fn test_client_errors_keep_message() {
        let api: ApiError = DataError::validation("project_name is required").into();
        assert_eq!(api.code, ErrorCode::ValidationFailed);
        assert_eq!(api.message, "project_name is required");
    }

    #[test]
    fn test_validation_lists_each_violation() {
        let api: ApiError = DataError::validation("\"\" is too short; 7 is not of type \"string\"").into();
        assert_eq!(
            api.details,
            Some(serde_json::json!(["\"\" is too short", "7 is not of type \"string\""]))
        );
    }

    #[test]
    fn test_forbidden_is_generic() {
        let api: ApiError = DataError::new(ErrorKind::Forbidden, "missing project:delete").into();
        assert_eq!(api.status_code(), StatusCode::FORBIDDEN);
        assert!(!api.message.contains("project:delete"));
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::from_code(ErrorCode::EntityAlreadyExists).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
