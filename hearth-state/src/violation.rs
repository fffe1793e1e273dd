//! Recoverable problems found while merging.
//!
//! A violation never aborts a merge: the offending field keeps its previous
//! value (or falls back to its default, or is dropped) and sibling fields
//! are processed as usual. Each violation is logged when it happens and,
//! unless disabled in the config, returned in the merge report so a
//! reporting layer can surface it to an operator.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// The value could not be coerced to the field's primitive.
    #[error("'{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    /// A numeric value fell outside the declared bounds.
    #[error("'{path}': {value} is outside {}", bounds(.min, .max))]
    OutOfRange {
        path: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// The value is not in the field's allow-list.
    #[error("'{path}': {value} is not an allowed value")]
    NotAllowed { path: String, value: Value },

    /// A patch tried to delete a mandatory field.
    #[error("'{path}': mandatory field cannot be deleted")]
    MandatoryDelete { path: String },

    /// A mandatory field is absent and no exclusive partner excuses it.
    #[error("'{path}': mandatory field is missing")]
    MandatoryMissing { path: String },

    /// More than one existing array element matches the incoming key.
    #[error("'{path}': key {key} matches more than one element")]
    AmbiguousKey { path: String, key: Value },

    /// The incoming element's key is missing, malformed or rejected.
    #[error("'{path}': invalid key {key}")]
    InvalidKey { path: String, key: Value },
}

impl Violation {
    /// The dotted path of the field the violation concerns.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::InvalidValue { path, .. }
            | Self::OutOfRange { path, .. }
            | Self::NotAllowed { path, .. }
            | Self::MandatoryDelete { path }
            | Self::MandatoryMissing { path }
            | Self::AmbiguousKey { path, .. }
            | Self::InvalidKey { path, .. } => path,
        }
    }
}

fn bounds(min: &Option<f64>, max: &Option<f64>) -> String {
    match (*min, *max) {
        (Some(min), Some(max)) => format!("[{min}, {max}]"),
        (Some(min), None) => format!("[{min}, ..)"),
        (None, Some(max)) => format!("(.., {max}]"),
        (None, None) => "(.., ..)".to_string(),
    }
}
