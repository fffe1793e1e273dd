use crate::Document;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// The change tree produced by one merge.
///
/// A scalar or array field that changed is [`Diff::Changed`]; an object
/// field is [`Diff::Nested`] and lists only the attributes that changed
/// underneath it. An object merge with no changes collapses to
/// [`Diff::Unchanged`], so `Nested` maps are never empty.
///
/// Serializes as `false`, `true`, or an object of nested diffs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Diff {
    #[default]
    Unchanged,
    Changed,
    Nested(BTreeMap<String, Diff>),
}

impl Diff {
    /// Builds an object diff from per-field changes.
    #[must_use]
    pub fn from_changes(changes: BTreeMap<String, Diff>) -> Self {
        if changes.is_empty() {
            Self::Unchanged
        } else {
            Self::Nested(changes)
        }
    }

    /// Compares two documents key by key, recursing where both sides hold
    /// an object.
    #[must_use]
    pub fn between(old: &Document, new: &Document) -> Self {
        let mut changes = BTreeMap::new();
        for (name, before) in old {
            let diff = match (before, new.get(name)) {
                (Value::Object(a), Some(Value::Object(b))) => Self::between(a, b),
                (a, Some(b)) if a == b => Self::Unchanged,
                _ => Self::Changed,
            };
            if diff.is_changed() {
                changes.insert(name.clone(), diff);
            }
        }
        for name in new.keys() {
            if !old.contains_key(name) {
                changes.insert(name.clone(), Self::Changed);
            }
        }
        Self::from_changes(changes)
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Returns the diff recorded for a direct child field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Diff> {
        match self {
            Self::Nested(children) => children.get(field),
            _ => None,
        }
    }

    /// Returns true if the direct child field changed.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some_and(Diff::is_changed)
    }

    /// Names of the direct child fields that changed, in sorted order.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&str> {
        match self {
            Self::Nested(children) => children.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Dotted paths of every changed leaf, e.g. `color.spectrumRgb`.
    /// A `Changed` root yields a single empty path.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Self::Unchanged => {}
            Self::Changed => out.push(prefix.to_string()),
            Self::Nested(children) => {
                for (name, child) in children {
                    let path = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{prefix}.{name}")
                    };
                    child.collect_paths(&path, out);
                }
            }
        }
    }
}

impl Serialize for Diff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unchanged => serializer.serialize_bool(false),
            Self::Changed => serializer.serialize_bool(true),
            Self::Nested(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (name, child) in children {
                    map.serialize_entry(name, child)?;
                }
                map.end()
            }
        }
    }
}
