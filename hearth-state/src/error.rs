//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type for engine operations.
pub type StateResult<T> = Result<T, StateError>;

/// Caller-fatal errors. Any of these aborts the merge and leaves the state
/// document untouched; recoverable problems are reported as
/// [`Violation`](crate::Violation)s instead.
#[derive(Debug, Error)]
pub enum StateError {
    /// A value of the wrong JSON type was supplied where the schema
    /// requires an object (object fields, array-of-object elements,
    /// copy-object containers, the patch root).
    #[error("field '{path}' expects an object, got {found}")]
    ExpectedObject { path: String, found: &'static str },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn expected_object(path: &str, found: &serde_json::Value) -> Self {
        Self::ExpectedObject {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            found: json_type(found),
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
