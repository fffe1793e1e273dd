//! Schemas: ordered maps of field descriptors, validated at construction.
//!
//! A schema is assembled once per device configuration, either in code via
//! [`SchemaBuilder`] or from JSON via [`Schema::from_value`]. In JSON a field
//! is either a bare kind (`"on": "bool|mandatory"`, `"on": 129`) or a full
//! descriptor object; both normalize to a [`FieldDescriptor`] here so the
//! engine never branches on the shorthand.
//!
//! Exclusivity is resolved into groups. A field either names its group
//! (`exclusive_group`) or lists its partners (`exclusive_states`); listed
//! partners must name each other back as one clique.

use crate::{AllowedKeys, FieldDescriptor};
use hearth_types::{Kind, Shape};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while building a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field '{field}' holds objects but declares no attributes")]
    MissingAttributes { field: String },

    #[error("field '{field}' is {kind} and cannot declare attributes")]
    UnexpectedAttributes { field: String, kind: Kind },

    #[error("field '{field}' declares a key but is not an array of objects")]
    KeyOnNonArray { field: String },

    #[error("key '{key}' of field '{field}' is not a scalar attribute")]
    InvalidKeyField { field: String, key: String },

    #[error("field '{field}' has min {min} above max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("field '{field}' names unknown exclusive partner '{partner}'")]
    UnknownExclusivePartner { field: String, partner: String },

    #[error("fields '{field}' and '{partner}' do not declare the same exclusive states")]
    AsymmetricExclusivity { field: String, partner: String },

    #[error("field '{field}' is placed in more than one exclusive group")]
    ConflictingGroups { field: String },

    #[error("in '{field}': {source}")]
    Nested {
        field: String,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("invalid schema document: {0}")]
    Json(#[from] serde_json::Error),
}

/// An ordered map of field name to descriptor.
///
/// Declaration order is merge order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldDescriptor>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Parses a schema from its JSON form.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let raw: IndexMap<String, DescriptorRepr> = serde_json::from_value(value)?;
        Self::from_repr(raw)
    }

    /// Parses a schema from JSON text.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let raw: IndexMap<String, DescriptorRepr> = serde_json::from_str(json)?;
        Self::from_repr(raw)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields.get(field)
    }

    /// Declaration index of a field.
    #[must_use]
    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.get_index_of(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Exclusive groups at this level, keyed by group name.
    #[must_use]
    pub fn exclusive_groups(&self) -> IndexMap<&str, Vec<&str>> {
        let mut groups: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (name, desc) in self.iter() {
            if let Some(group) = desc.exclusive_group() {
                groups.entry(group).or_default().push(name);
            }
        }
        groups
    }

    fn from_repr(raw: IndexMap<String, DescriptorRepr>) -> Result<Self, SchemaError> {
        let mut builder = Self::builder();
        for (name, repr) in raw {
            let desc = repr.into_descriptor().map_err(|source| SchemaError::Nested {
                field: name.clone(),
                source: Box::new(source),
            })?;
            builder = builder.field(name, desc);
        }
        builder.build()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, DescriptorRepr>::deserialize(deserializer)?;
        Self::from_repr(raw).map_err(serde::de::Error::custom)
    }
}

/// Collects fields and groups, then validates them into a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    fields: IndexMap<String, FieldDescriptor>,
    groups: Vec<(String, Vec<String>)>,
}

impl SchemaBuilder {
    /// Adds (or replaces) a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, desc: impl Into<FieldDescriptor>) -> Self {
        self.fields.insert(name.into(), desc.into());
        self
    }

    /// Declares mutually exclusive sibling fields under one group name.
    #[must_use]
    pub fn exclusive_group<I, S>(mut self, group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .push((group.into(), members.into_iter().map(Into::into).collect()));
        self
    }

    /// Validates every descriptor and resolves exclusivity.
    pub fn build(mut self) -> Result<Schema, SchemaError> {
        for (name, desc) in &self.fields {
            validate_descriptor(name, desc)?;
        }

        for (group, members) in std::mem::take(&mut self.groups) {
            for member in members {
                let desc = self.fields.get_mut(&member).ok_or_else(|| {
                    SchemaError::UnknownExclusivePartner {
                        field: group.clone(),
                        partner: member.clone(),
                    }
                })?;
                assign_group(&member, desc, &group)?;
            }
        }

        self.resolve_exclusive_states()?;

        let mut members_by_group: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, desc) in &self.fields {
            if let Some(group) = desc.exclusive_group() {
                members_by_group
                    .entry(group.to_string())
                    .or_default()
                    .push(name.clone());
            }
        }
        for (name, desc) in self.fields.iter_mut() {
            let Some(members) = desc.exclusive_group().and_then(|g| members_by_group.get(g)) else {
                continue;
            };
            let partners = members.iter().filter(|m| *m != name).cloned().collect();
            desc.set_exclusive_with(partners);
        }

        Ok(Schema {
            fields: self.fields,
        })
    }

    /// Turns `exclusive_states` lists into groups, checking that every
    /// listed partner declares the same clique.
    fn resolve_exclusive_states(&mut self) -> Result<(), SchemaError> {
        let clique = |name: &str, desc: &FieldDescriptor| -> BTreeSet<String> {
            let mut set: BTreeSet<String> = desc.exclusive_states().iter().cloned().collect();
            set.insert(name.to_string());
            set
        };

        let mut assignments = Vec::new();
        for (name, desc) in &self.fields {
            if desc.exclusive_states().is_empty() {
                continue;
            }
            let own = clique(name, desc);
            for partner in desc.exclusive_states() {
                let other = self.fields.get(partner).ok_or_else(|| {
                    SchemaError::UnknownExclusivePartner {
                        field: name.clone(),
                        partner: partner.clone(),
                    }
                })?;
                if clique(partner, other) != own {
                    return Err(SchemaError::AsymmetricExclusivity {
                        field: name.clone(),
                        partner: partner.clone(),
                    });
                }
            }
            let group = own.into_iter().collect::<Vec<_>>().join("|");
            assignments.push((name.clone(), group));
        }

        for (name, group) in assignments {
            if let Some(desc) = self.fields.get_mut(&name) {
                assign_group(&name, desc, &group)?;
            }
        }
        Ok(())
    }
}

fn assign_group(name: &str, desc: &mut FieldDescriptor, group: &str) -> Result<(), SchemaError> {
    match desc.exclusive_group() {
        Some(existing) if existing != group => Err(SchemaError::ConflictingGroups {
            field: name.to_string(),
        }),
        _ => {
            desc.set_exclusive_group(group.to_string());
            Ok(())
        }
    }
}

fn validate_descriptor(name: &str, desc: &FieldDescriptor) -> Result<(), SchemaError> {
    let kind = desc.kind();
    match (kind.shape().holds_objects(), desc.attributes()) {
        (true, None) => {
            return Err(SchemaError::MissingAttributes {
                field: name.to_string(),
            });
        }
        (false, Some(_)) => {
            return Err(SchemaError::UnexpectedAttributes {
                field: name.to_string(),
                kind,
            });
        }
        _ => {}
    }

    if !desc.key_id().is_empty() {
        if kind.shape() != Shape::ObjectArray {
            return Err(SchemaError::KeyOnNonArray {
                field: name.to_string(),
            });
        }
        for key in desc.key_id() {
            let is_scalar = desc
                .attributes()
                .and_then(|attrs| attrs.get(key))
                .is_some_and(|attr| matches!(attr.kind().shape(), Shape::Scalar(_)));
            if !is_scalar {
                return Err(SchemaError::InvalidKeyField {
                    field: name.to_string(),
                    key: key.clone(),
                });
            }
        }
    }

    if let (Some(min), Some(max)) = (desc.min(), desc.max()) {
        if min > max {
            return Err(SchemaError::InvalidRange {
                field: name.to_string(),
                min,
                max,
            });
        }
    }
    Ok(())
}

// ── JSON representation ──────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorRepr {
    Bare(Kind),
    Full(Box<FullDescriptorRepr>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyIdRepr {
    Single(String),
    Composite(Vec<String>),
}

#[derive(Deserialize)]
struct FullDescriptorRepr {
    kind: Kind,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default, alias = "defaultValue")]
    default_value: Option<Value>,
    #[serde(default)]
    attributes: Option<IndexMap<String, DescriptorRepr>>,
    #[serde(default, alias = "keyId")]
    key_id: Option<KeyIdRepr>,
    #[serde(default, alias = "addIfMissing")]
    add_if_missing: Option<bool>,
    #[serde(default, alias = "replaceAll")]
    replace_all: Option<bool>,
    #[serde(default, alias = "removeIfNoData")]
    remove_if_no_data: Option<bool>,
    #[serde(default, alias = "validKeys")]
    valid_keys: Option<Vec<Value>>,
    #[serde(default, alias = "exclusiveGroup")]
    exclusive_group: Option<String>,
    #[serde(default, alias = "exclusiveStates")]
    exclusive_states: Vec<String>,
    #[serde(default, alias = "upperCase", alias = "toUpperCase")]
    upper_case: bool,
}

impl DescriptorRepr {
    fn into_descriptor(self) -> Result<FieldDescriptor, SchemaError> {
        let full = match self {
            DescriptorRepr::Bare(kind) => return Ok(FieldDescriptor::new(kind)),
            DescriptorRepr::Full(full) => *full,
        };

        let mut desc = FieldDescriptor::new(full.kind);
        if let Some(min) = full.min {
            desc = desc.with_min(min);
        }
        if let Some(max) = full.max {
            desc = desc.with_max(max);
        }
        if let Some(values) = full.values {
            desc = desc.with_values(values);
        }
        if let Some(default) = full.default_value {
            desc = desc.with_default(default);
        }
        if let Some(attributes) = full.attributes {
            desc = desc.with_attributes(Schema::from_repr(attributes)?);
        }
        match full.key_id {
            Some(KeyIdRepr::Single(key)) => desc = desc.with_key(key),
            Some(KeyIdRepr::Composite(keys)) => desc = desc.with_composite_key(keys),
            None => {}
        }
        if let Some(add) = full.add_if_missing {
            desc = desc.with_add_if_missing(add);
        }
        if let Some(replace) = full.replace_all {
            desc = desc.with_replace_all(replace);
        }
        if let Some(remove) = full.remove_if_no_data {
            desc = desc.with_remove_if_no_data(remove);
        }
        if let Some(keys) = full.valid_keys {
            desc = desc.with_key_validator(AllowedKeys::new(keys));
        }
        if let Some(group) = full.exclusive_group {
            desc = desc.in_exclusive_group(group);
        }
        if !full.exclusive_states.is_empty() {
            desc = desc.with_exclusive_states(full.exclusive_states);
        }
        if full.upper_case {
            desc = desc.with_upper_case();
        }
        Ok(desc)
    }
}
