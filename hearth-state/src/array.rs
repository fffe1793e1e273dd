//! Reconciliation of arrays of objects.
//!
//! Incoming elements are matched to existing ones either by position or,
//! when the descriptor names key fields, by key. Matched elements are
//! merged in place; unmatched ones are appended when `add_if_missing`
//! allows. With `replace_all` the result is exactly the list built from the
//! patch, otherwise untouched old elements survive.

use crate::pass::{FieldOutcome, MergePass, as_items, changed_if, normalize_case, same_value};
use crate::{StateError, StateResult, Violation};
use hearth_model::{Diff, Document, FieldDescriptor, Schema};
use hearth_types::coerce;
use serde_json::{Map, Value};
use std::mem;

/// Where an incoming element is merged.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// An element already produced by this patch.
    Built(usize),
    /// An element of the previous sequence.
    Old(usize),
    New,
}

enum Lookup {
    Found(Slot),
    Missing,
    Ambiguous,
}

struct Elements {
    replace_all: bool,
    old: Vec<Document>,
    built: Vec<Document>,
}

impl Elements {
    fn new(replace_all: bool, current: Option<&Value>) -> Self {
        let old = match current {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        };
        Self {
            replace_all,
            old,
            built: Vec::new(),
        }
    }

    fn positional(&self, index: usize, add_if_missing: bool) -> Option<Slot> {
        if index < self.old.len() {
            Some(Slot::Old(index))
        } else if add_if_missing {
            Some(Slot::New)
        } else {
            None
        }
    }

    fn find(&self, key_id: &[String], key: &[Value]) -> Lookup {
        if self.replace_all {
            match find_in(&self.built, key_id, key, Slot::Built) {
                Lookup::Missing => {}
                found => return found,
            }
        }
        find_in(&self.old, key_id, key, Slot::Old)
    }

    fn take(&mut self, slot: Slot) -> Document {
        match (slot, self.replace_all) {
            (Slot::Built(i), _) => mem::take(&mut self.built[i]),
            (Slot::Old(i), true) => self.old[i].clone(),
            (Slot::Old(i), false) => mem::take(&mut self.old[i]),
            (Slot::New, _) => Map::new(),
        }
    }

    fn put(&mut self, slot: Slot, element: Document) {
        match (slot, self.replace_all) {
            (Slot::Built(i), _) => self.built[i] = element,
            (Slot::Old(i), false) => self.old[i] = element,
            (Slot::Old(_) | Slot::New, true) => self.built.push(element),
            (Slot::New, false) => self.old.push(element),
        }
    }

    fn finish(self) -> Vec<Value> {
        let elements = if self.replace_all { self.built } else { self.old };
        elements
            .into_iter()
            .filter(|element| !element.is_empty())
            .map(Value::Object)
            .collect()
    }
}

fn find_in(
    elements: &[Document],
    key_id: &[String],
    key: &[Value],
    slot: fn(usize) -> Slot,
) -> Lookup {
    let mut matches = elements
        .iter()
        .enumerate()
        .filter(|(_, element)| matches_key(element, key_id, key))
        .map(|(i, _)| i);
    match (matches.next(), matches.next()) {
        (None, _) => Lookup::Missing,
        (Some(i), None) => Lookup::Found(slot(i)),
        (Some(_), Some(_)) => Lookup::Ambiguous,
    }
}

fn matches_key(element: &Document, key_id: &[String], key: &[Value]) -> bool {
    key_id
        .iter()
        .zip(key)
        .all(|(field, wanted)| element.get(field).is_some_and(|v| same_value(v, wanted)))
}

/// A single key is reported bare, a composite one as a sequence.
fn key_value(key: &[Value]) -> Value {
    match key {
        [single] => single.clone(),
        composite => Value::Array(composite.to_vec()),
    }
}

fn canonical_key(desc: &FieldDescriptor, key: &[Value]) -> Option<Vec<Value>> {
    let Some(validator) = desc.key_validator() else {
        return Some(key.to_vec());
    };
    match validator.validate(&key_value(key))? {
        Value::Array(parts) if key.len() > 1 && parts.len() == key.len() => Some(parts),
        _ if key.len() > 1 => None,
        single => Some(vec![single]),
    }
}

impl MergePass<'_> {
    pub(crate) fn merge_object_array(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> StateResult<FieldOutcome> {
        let Some(attributes) = desc.attributes() else {
            return Ok(FieldOutcome::rejected(Diff::Unchanged));
        };
        let key_id = desc.key_id();
        let delete_missing = desc.kind().deletes_missing();
        let mut elements = Elements::new(desc.replace_all(), parent.get(name));

        for (index, item) in as_items(value).iter().enumerate() {
            let element_path = format!("{path}[{index}]");
            let Some(patch) = item.as_object() else {
                self.structural(StateError::expected_object(&element_path, item))?;
                continue;
            };

            let (slot, key) = if key_id.is_empty() {
                match elements.positional(index, desc.add_if_missing()) {
                    Some(slot) => (slot, None),
                    None => {
                        self.trace(&element_path, "dropped element beyond existing sequence");
                        continue;
                    }
                }
            } else {
                match self.keyed_slot(desc, attributes, &elements, patch, &element_path) {
                    Some((slot, key)) => (slot, Some(key)),
                    None => continue,
                }
            };

            let mut target = elements.take(slot);
            self.merge_object(attributes, delete_missing, &mut target, patch, &element_path)?;
            if let Some(key) = key
                && !target.is_empty()
            {
                for (field, part) in key_id.iter().zip(key) {
                    target.insert(field.clone(), part);
                }
            }
            elements.put(slot, target);
        }

        let result = elements.finish();
        let next = if result.is_empty() && desc.remove_if_no_data() {
            None
        } else {
            Some(Value::Array(result))
        };
        let accepted = next.is_some();
        let diff = match next {
            Some(next) if parent.get(name) != Some(&next) => {
                parent.insert(name.to_string(), next);
                Diff::Changed
            }
            Some(_) => Diff::Unchanged,
            None => changed_if(parent.remove(name).is_some()),
        };
        Ok(FieldOutcome { diff, accepted })
    }

    /// Resolves the slot of a keyed element, returning the key to stamp
    /// on it. `None` means the element is skipped.
    fn keyed_slot(
        &mut self,
        desc: &FieldDescriptor,
        attributes: &Schema,
        elements: &Elements,
        patch: &Document,
        path: &str,
    ) -> Option<(Slot, Vec<Value>)> {
        let key_id = desc.key_id();
        let key = self.element_key(attributes, key_id, patch, path)?;

        match elements.find(key_id, &key) {
            Lookup::Found(slot) => return Some((slot, key)),
            Lookup::Ambiguous => {
                self.report(Violation::AmbiguousKey {
                    path: path.to_string(),
                    key: key_value(&key),
                });
                return None;
            }
            Lookup::Missing => {}
        }

        let Some(canonical) = canonical_key(desc, &key) else {
            self.report(Violation::InvalidKey {
                path: path.to_string(),
                key: key_value(&key),
            });
            return None;
        };
        match elements.find(key_id, &canonical) {
            Lookup::Found(slot) => Some((slot, canonical)),
            Lookup::Ambiguous => {
                self.report(Violation::AmbiguousKey {
                    path: path.to_string(),
                    key: key_value(&canonical),
                });
                None
            }
            Lookup::Missing if desc.add_if_missing() => Some((Slot::New, canonical)),
            Lookup::Missing => {
                self.trace(path, "dropped element with unknown key");
                None
            }
        }
    }

    /// Coerces the key fields of an incoming element.
    fn element_key(
        &mut self,
        attributes: &Schema,
        key_id: &[String],
        patch: &Document,
        path: &str,
    ) -> Option<Vec<Value>> {
        let mut key = Vec::with_capacity(key_id.len());
        for field in key_id {
            let raw = patch.get(field);
            let coerced = attributes.get(field).and_then(|attr| {
                let primitive = attr.kind().primitive()?;
                let value = coerce(field, raw, primitive, None).ok().flatten()?;
                Some(normalize_case(attr, value))
            });
            match coerced {
                Some(part) => key.push(part),
                None => {
                    self.report(Violation::InvalidKey {
                        path: path.to_string(),
                        key: raw.cloned().unwrap_or(Value::Null),
                    });
                    return None;
                }
            }
        }
        Some(key)
    }
}
