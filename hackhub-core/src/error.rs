//! Canonical error taxonomy for HackHub data operations.
//!
//! Storage failures are translated into an [`ErrorKind`] exactly once, at the
//! Unit-of-Work boundary. Everything above that boundary passes a
//! [`DataError`] through unchanged; the only errors raised above it are
//! schema validation failures and authorization denials.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Category of a data-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Entity failed its schema check; raised before any statement runs.
    Validation,
    /// Unique constraint violation.
    Duplicate,
    /// Foreign key violation while inserting or updating.
    DependencyMissing,
    /// Foreign key violation while deleting.
    ReferencedElsewhere,
    /// NOT NULL constraint violation.
    NullConstraint,
    /// No rows (SQL) or no such entity.
    NotFound,
    /// Statement could not be parsed. Always a programming bug.
    MalformedStatement,
    /// Store unreachable, pool closed or pool wait timed out.
    Unavailable,
    /// Caller lacks the capability for the operation.
    Forbidden,
    /// Anything the translation table does not know about.
    Unknown,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation
            | ErrorKind::DependencyMissing
            | ErrorKind::ReferencedElsewhere
            | ErrorKind::NullConstraint => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Duplicate => 409,
            ErrorKind::MalformedStatement | ErrorKind::Unavailable | ErrorKind::Unknown => 500,
        }
    }

    /// Whether the failure is the caller's fault (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Default user-facing message.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation failed",
            ErrorKind::Duplicate => "Duplicate objects not allowed",
            ErrorKind::DependencyMissing => "Object depends on a non-existent dependency",
            ErrorKind::ReferencedElsewhere => "Cannot delete as this object is referenced elsewhere",
            ErrorKind::NullConstraint => "A required property was found to be null",
            ErrorKind::NotFound => "No data was found for this query",
            ErrorKind::MalformedStatement => "The statement was ill-formed",
            ErrorKind::Unavailable => "Could not connect to the database",
            ErrorKind::Forbidden => "Insufficient permissions for this operation",
            ErrorKind::Unknown => "Unknown database error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// DATA ERROR
// ============================================================================

/// A translated data-layer failure.
///
/// `detail` carries driver-level information (SQLSTATE, server message) for
/// logs. It is never meant to reach an end user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct DataError {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl DataError {
    /// Create an error with an explicit message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Create an error with the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Attach internal detail for logging.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Authorization denial. The message never names the capability.
    pub fn forbidden() -> Self {
        Self::from_kind(ErrorKind::Forbidden)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

/// Result alias for data-layer operations.
pub type DataResult<T> = Result<T, DataError>;

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::unknown("Failed to map stored data").with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
        prop::sample::select(vec![
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
        ])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every kind maps to a status the API layer knows, and the
        /// client/server split agrees with that status.
        #[test]
        fn prop_status_and_client_split_agree(kind in arb_error_kind()) {
            let status = kind.status_code();
            prop_assert!([400, 403, 404, 409, 500].contains(&status));
            prop_assert_eq!(kind.is_client_error(), status < 500);
        }

        /// An error reports its kind's status and never prints its detail.
        #[test]
        fn prop_error_hides_detail(
            kind in arb_error_kind(),
            message in "[a-z ]{1,20}",
            detail in "SQLSTATE [0-9A-Z]{5}",
        ) {
            let err = DataError::new(kind, message.clone()).with_detail(detail.clone());
            prop_assert_eq!(err.status_code(), kind.status_code());
            let display = err.to_string();
            prop_assert!(display.contains(&message));
            prop_assert!(!display.contains(&detail));
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::Duplicate.status_code(), 409);
        assert_eq!(ErrorKind::DependencyMissing.status_code(), 400);
        assert_eq!(ErrorKind::ReferencedElsewhere.status_code(), 400);
        assert_eq!(ErrorKind::NullConstraint.status_code(), 400);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::MalformedStatement.status_code(), 500);
        assert_eq!(ErrorKind::Unavailable.status_code(), 500);
        assert_eq!(ErrorKind::Unknown.status_code(), 500);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
    }

    #[test]
    fn test_client_error_split() {
        assert!(ErrorKind::Duplicate.is_client_error());
        assert!(ErrorKind::Forbidden.is_client_error());
        assert!(!ErrorKind::MalformedStatement.is_client_error());
        assert!(!ErrorKind::Unavailable.is_client_error());
    }

    #[test]
    fn test_forbidden_message_is_generic() {
        let err = DataError::forbidden();
        assert_eq!(err.message, "Insufficient permissions for this operation");
        assert!(err.detail.is_none());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = DataError::not_found("no rows").with_detail("SELECT 1");
        let display = err.to_string();
        assert!(display.contains("NotFound"));
        assert!(display.contains("no rows"));
        assert!(!display.contains("SELECT 1"));
    }

    #[test]
    fn test_kind_serialization() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&ErrorKind::DependencyMissing)?;
        assert_eq!(json, "\"DEPENDENCY_MISSING\"");
        Ok(())
    }
}
