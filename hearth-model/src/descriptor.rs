//! Field descriptors: the per-field rules a schema is made of.
//!
//! A descriptor pairs a [`Kind`] with the optional constraints the engine
//! applies to it, such as bounds, an allow-list or exclusivity partners.
//! Object array policies left unset are derived: `replace_all` holds for
//! positional arrays, and `remove_if_no_data` for optional fields.

use crate::{KeyValidator, Schema};
use hearth_types::{Kind, Primitive};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Describes how one field of a state document is validated and merged.
///
/// Built with chained `with_*` calls, then placed into a [`Schema`] through
/// [`Schema::builder`]. A bare [`Kind`] converts into a descriptor with no
/// further constraints.
#[derive(Clone)]
pub struct FieldDescriptor {
    kind: Kind,
    min: Option<f64>,
    max: Option<f64>,
    values: Option<Vec<Value>>,
    default_value: Option<Value>,
    attributes: Option<Schema>,
    key_id: Vec<String>,
    add_if_missing: bool,
    replace_all: Option<bool>,
    remove_if_no_data: Option<bool>,
    key_validator: Option<Arc<dyn KeyValidator>>,
    exclusive_group: Option<String>,
    exclusive_states: Vec<String>,
    exclusive_with: Vec<String>,
    upper_case: bool,
}

impl FieldDescriptor {
    /// Creates a descriptor with no constraints.
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            min: None,
            max: None,
            values: None,
            default_value: None,
            attributes: None,
            key_id: Vec::new(),
            add_if_missing: true,
            replace_all: None,
            remove_if_no_data: None,
            key_validator: None,
            exclusive_group: None,
            exclusive_states: Vec::new(),
            exclusive_with: Vec::new(),
            upper_case: false,
        }
    }

    /// Shorthand for an object field with the given attributes.
    #[must_use]
    pub fn object(attributes: Schema) -> Self {
        Self::new(Kind::object()).with_attributes(attributes)
    }

    /// Shorthand for an array of objects with the given attributes.
    #[must_use]
    pub fn object_array(attributes: Schema) -> Self {
        Self::new(Kind::object_array()).with_attributes(attributes)
    }

    /// Shorthand for a scalar field.
    #[must_use]
    pub fn scalar(primitive: Primitive) -> Self {
        Self::new(Kind::scalar(primitive))
    }

    #[must_use]
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Inclusive numeric bounds.
    #[must_use]
    pub fn with_range(self, min: f64, max: f64) -> Self {
        self.with_min(min).with_max(max)
    }

    /// Allow-list of accepted values.
    #[must_use]
    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Schema) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Reconcile array elements by a single key field.
    #[must_use]
    pub fn with_key(self, key: impl Into<String>) -> Self {
        self.with_composite_key([key.into()])
    }

    /// Reconcile array elements by several key fields at once.
    #[must_use]
    pub fn with_composite_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_id = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_add_if_missing(mut self, add: bool) -> Self {
        self.add_if_missing = add;
        self
    }

    #[must_use]
    pub fn with_replace_all(mut self, replace: bool) -> Self {
        self.replace_all = Some(replace);
        self
    }

    #[must_use]
    pub fn with_remove_if_no_data(mut self, remove: bool) -> Self {
        self.remove_if_no_data = Some(remove);
        self
    }

    #[must_use]
    pub fn with_key_validator(mut self, validator: impl KeyValidator + 'static) -> Self {
        self.key_validator = Some(Arc::new(validator));
        self
    }

    /// Places the field in a named exclusivity group.
    #[must_use]
    pub fn in_exclusive_group(mut self, group: impl Into<String>) -> Self {
        self.exclusive_group = Some(group.into());
        self
    }

    /// Lists sibling fields this one excludes. Every listed sibling must
    /// list the same set back; the schema builder checks this.
    #[must_use]
    pub fn with_exclusive_states<I, S>(mut self, partners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive_states = partners.into_iter().map(Into::into).collect();
        self
    }

    /// Upper-cases string values before the allow-list check.
    #[must_use]
    pub fn with_upper_case(mut self) -> Self {
        self.upper_case = true;
        self
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.kind.is_mandatory()
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    #[must_use]
    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    #[must_use]
    pub fn attributes(&self) -> Option<&Schema> {
        self.attributes.as_ref()
    }

    /// Key fields for keyed array reconciliation; empty means positional.
    #[must_use]
    pub fn key_id(&self) -> &[String] {
        &self.key_id
    }

    #[must_use]
    pub fn add_if_missing(&self) -> bool {
        self.add_if_missing
    }

    /// Whether the merged sequence replaces the old one. Defaults to true
    /// for positional arrays and false for keyed ones.
    #[must_use]
    pub fn replace_all(&self) -> bool {
        self.replace_all.unwrap_or(self.key_id.is_empty())
    }

    /// Whether an emptied array removes the field. Defaults to the inverse
    /// of mandatory.
    #[must_use]
    pub fn remove_if_no_data(&self) -> bool {
        self.remove_if_no_data.unwrap_or(!self.kind.is_mandatory())
    }

    #[must_use]
    pub fn key_validator(&self) -> Option<&dyn KeyValidator> {
        self.key_validator.as_deref()
    }

    #[must_use]
    pub fn exclusive_group(&self) -> Option<&str> {
        self.exclusive_group.as_deref()
    }

    pub(crate) fn exclusive_states(&self) -> &[String] {
        &self.exclusive_states
    }

    /// Sibling fields evicted when this field accepts a value.
    #[must_use]
    pub fn exclusive_with(&self) -> &[String] {
        &self.exclusive_with
    }

    #[must_use]
    pub fn upper_case(&self) -> bool {
        self.upper_case
    }

    /// The descriptor each key of a copy-object container is merged with:
    /// the same constraints, without the copy shape or exclusivity.
    #[must_use]
    pub fn copied_entry(&self) -> Self {
        let mut entry = self.clone();
        entry.kind = self.kind.without_copy();
        entry.exclusive_group = None;
        entry.exclusive_states.clear();
        entry.exclusive_with.clear();
        entry
    }

    pub(crate) fn set_exclusive_group(&mut self, group: String) {
        self.exclusive_group = Some(group);
    }

    pub(crate) fn set_exclusive_with(&mut self, partners: Vec<String>) {
        self.exclusive_with = partners;
    }
}

impl From<Kind> for FieldDescriptor {
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("kind", &self.kind)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("values", &self.values)
            .field("default_value", &self.default_value)
            .field("attributes", &self.attributes)
            .field("key_id", &self.key_id)
            .field("add_if_missing", &self.add_if_missing)
            .field("replace_all", &self.replace_all())
            .field("remove_if_no_data", &self.remove_if_no_data())
            .field("key_validator", &self.key_validator.is_some())
            .field("exclusive_with", &self.exclusive_with)
            .field("upper_case", &self.upper_case)
            .finish_non_exhaustive()
    }
}
