//! Core type definitions for Hearth.
//!
//! This crate is the leaf of the workspace and defines the value-level
//! vocabulary every other crate speaks:
//! - [`Primitive`] and [`Shape`], combined into a field [`Kind`]
//! - bit-flag compatibility for kinds declared as numeric masks
//! - [`coerce`], which turns loosely typed JSON input into a primitive
//!
//! Nothing here knows about schemas or state documents. Those live in
//! `hearth-model` and `hearth-state`.

mod coerce;
mod datetime;
mod kind;

pub use coerce::coerce;
pub use datetime::epoch_millis_to_iso;
pub use kind::{CopyShape, Kind, Primitive, Shape, bits};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A value could not be converted to the requested primitive.
    #[error("invalid value for '{key}' as {kind}: {value}")]
    InvalidValue {
        key: String,
        kind: Primitive,
        value: String,
    },

    /// A kind declaration combines flags that have no meaning together.
    #[error("invalid kind: {0}")]
    InvalidKind(String),
}

impl Error {
    pub(crate) fn invalid_value(key: &str, kind: Primitive, value: &serde_json::Value) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            kind,
            value: value.to_string(),
        }
    }
}
