//! Translation of driver failures into the canonical taxonomy.
//!
//! This is the only place that inspects SQLSTATE codes. Everything above the
//! Unit of Work sees a [`DataError`] whose kind was decided here.

use deadpool_postgres::PoolError;
use hackhub_core::{DataError, ErrorKind};

/// Classify a SQLSTATE code.
///
/// `message` is the server's primary message; it separates the two sides of a
/// foreign key violation, which share SQLSTATE 23503.
pub fn classify_sqlstate(code: &str, message: &str) -> ErrorKind {
    match code {
        "23505" => ErrorKind::Duplicate,
        "23503" => {
            if message.contains("update or delete on table") || message.contains("is still referenced") {
                ErrorKind::ReferencedElsewhere
            } else {
                ErrorKind::DependencyMissing
            }
        }
        "23502" => ErrorKind::NullConstraint,
        "53300" | "57P01" | "57P02" | "57P03" => ErrorKind::Unavailable,
        c if c.starts_with("42") => ErrorKind::MalformedStatement,
        c if c.starts_with("08") => ErrorKind::Unavailable,
        _ => ErrorKind::Unknown,
    }
}

/// Translate an execution failure.
pub fn from_pg_error(err: &tokio_postgres::Error) -> DataError {
    let kind = match err.as_db_error() {
        Some(db) => classify_sqlstate(db.code().code(), db.message()),
        None if err.is_closed() => ErrorKind::Unavailable,
        None => match err.code() {
            Some(code) => classify_sqlstate(code.code(), ""),
            None => ErrorKind::Unknown,
        },
    };

    let detail = match err.as_db_error() {
        Some(db) => format!("SQLSTATE {}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    };

    DataError::from_kind(kind).with_detail(detail)
}

/// Translate a failure to obtain a connection.
pub fn from_pool_error(err: PoolError) -> DataError {
    match err {
        PoolError::Timeout(timeout) => DataError::unavailable("Database connection pool exhausted")
            .with_detail(format!("pool timeout: {:?}", timeout)),
        PoolError::Closed => {
            DataError::unavailable("Database connection pool is closed").with_detail("pool closed")
        }
        PoolError::Backend(e) => {
            let translated = from_pg_error(&e);
            if translated.kind == ErrorKind::Unknown {
                // A connection that could not be established at all.
                DataError::from_kind(ErrorKind::Unavailable)
                    .with_detail(translated.detail.unwrap_or_default())
            } else {
                translated
            }
        }
        other => DataError::from_kind(ErrorKind::Unavailable).with_detail(other.to_string()),
    }
}
