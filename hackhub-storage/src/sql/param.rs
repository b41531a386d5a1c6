//! Type-erased statement parameters.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Type-erased SQL parameter.
///
/// Lets mappers build parameter lists without knowing the driver's concrete
/// types. Serializable so that the query cache can fingerprint a statement
/// together with its bound values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum SqlParam {
    /// Text value
    Text(String),
    /// Optional text value
    OptText(Option<String>),
    /// Integer value
    Int(i32),
    /// Optional integer value
    OptInt(Option<i32>),
    /// Long integer value
    Long(i64),
    /// Optional long value
    OptLong(Option<i64>),
    /// Boolean value
    Bool(bool),
    /// Optional boolean value
    OptBool(Option<bool>),
    /// Double-precision float
    Float(f64),
    /// JSON value
    Json(JsonValue),
    /// Optional JSON value
    OptJson(Option<JsonValue>),
    /// Timestamp with time zone
    Timestamp(chrono::DateTime<chrono::Utc>),
    /// Integer array, bound as `int4[]`
    IntArray(Vec<i32>),
    /// Text array, bound as `text[]`
    TextArray(Vec<String>),
}

impl SqlParam {
    /// Convert this SqlParam to a reference that can be used with tokio_postgres.
    pub fn as_to_sql(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            SqlParam::Text(v) => v,
            SqlParam::OptText(v) => v,
            SqlParam::Int(v) => v,
            SqlParam::OptInt(v) => v,
            SqlParam::Long(v) => v,
            SqlParam::OptLong(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::OptBool(v) => v,
            SqlParam::Float(v) => v,
            SqlParam::Json(v) => v,
            SqlParam::OptJson(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::IntArray(v) => v,
            SqlParam::TextArray(v) => v,
        }
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        SqlParam::OptText(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Long(v)
    }
}

impl From<Option<i64>> for SqlParam {
    fn from(v: Option<i64>) -> Self {
        SqlParam::OptLong(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<Vec<i32>> for SqlParam {
    fn from(v: Vec<i32>) -> Self {
        SqlParam::IntArray(v)
    }
}

impl From<Vec<String>> for SqlParam {
    fn from(v: Vec<String>) -> Self {
        SqlParam::TextArray(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_is_tagged() -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(&[SqlParam::Int(1), SqlParam::Long(1)])?;
        assert!(encoded.contains("\"Int\""));
        assert!(encoded.contains("\"Long\""));
        Ok(())
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(SqlParam::from("x"), SqlParam::Text("x".to_string()));
        assert_eq!(SqlParam::from(3i64), SqlParam::Long(3));
        assert_eq!(SqlParam::from(vec![1, 2]), SqlParam::IntArray(vec![1, 2]));
    }
}
