//! Schema and device model for Hearth.
//!
//! Defines the types shared by the reconciliation engine and its callers:
//! - [`FieldDescriptor`]: how one field is validated, coerced and merged
//! - [`Schema`]: an ordered map of field descriptors, built and validated once
//! - [`KeyValidator`]: accepts or canonicalizes keys of keyed object arrays
//! - [`Diff`]: the change tree a merge produces
//! - [`Device`]: the persisted pairing of attribute and state documents
//!
//! Which fields exist for which device trait is data handed in by the
//! caller; nothing here enumerates traits.

mod descriptor;
mod device;
mod diff;
mod schema;
mod validator;

pub use descriptor::FieldDescriptor;
pub use device::Device;
pub use diff::Diff;
pub use schema::{Schema, SchemaBuilder, SchemaError};
pub use validator::{AllowedKeys, KeyValidator};

/// A state or attribute document: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;
