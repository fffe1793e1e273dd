//! One merge pass: the recursive walk of schema, state and patch.
//!
//! Dispatch is structural, on the field's [`Shape`]:
//! null clears, scalars coerce, primitive arrays replace, objects recurse,
//! object arrays reconcile (see `array.rs`) and copy containers update
//! only the keys they already hold.

use crate::{ReconcilerConfig, StateError, StateResult, Violation};
use hearth_model::{Diff, Document, FieldDescriptor, Schema};
use hearth_types::{Primitive, Shape, coerce};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How structural misuse is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Structural errors abort the merge.
    Strict,
    /// Structural errors drop the offending field (used when loading).
    Lenient,
}

/// What merging one field produced.
pub(crate) struct FieldOutcome {
    pub(crate) diff: Diff,
    /// True if the patch supplied a value the field now holds. Only
    /// accepted values evict exclusive partners.
    pub(crate) accepted: bool,
}

impl FieldOutcome {
    pub(crate) fn rejected(diff: Diff) -> Self {
        Self {
            diff,
            accepted: false,
        }
    }

    pub(crate) fn accepted(diff: Diff) -> Self {
        Self {
            diff,
            accepted: true,
        }
    }
}

pub(crate) struct MergePass<'a> {
    config: &'a ReconcilerConfig,
    mode: Mode,
    violations: Vec<Violation>,
    /// Set on dry runs: nothing is logged or recorded.
    quiet: bool,
}

impl<'a> MergePass<'a> {
    pub(crate) fn new(config: &'a ReconcilerConfig, mode: Mode) -> Self {
        Self {
            config,
            mode,
            violations: Vec::new(),
            quiet: false,
        }
    }

    pub(crate) fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    pub(crate) fn report(&mut self, violation: Violation) {
        if self.quiet {
            return;
        }
        warn!(device = %self.config.device_id, "{violation}");
        if self.config.record_violations {
            self.violations.push(violation);
        }
    }

    /// Fails in strict mode; logs and lets the caller skip in lenient mode.
    pub(crate) fn structural(&self, err: StateError) -> StateResult<()> {
        match self.mode {
            Mode::Strict => Err(err),
            Mode::Lenient if self.quiet => Ok(()),
            Mode::Lenient => {
                warn!(device = %self.config.device_id, "dropping invalid data: {err}");
                Ok(())
            }
        }
    }

    pub(crate) fn trace(&self, path: &str, what: &str) {
        if self.quiet {
            return;
        }
        debug!(device = %self.config.device_id, path, "{what}");
    }

    /// Merges `patch` into `target` attribute by attribute.
    ///
    /// Attributes the patch omits are left alone unless `delete_missing` is
    /// set; then optional ones are deleted and mandatory ones are deleted
    /// only when an exclusive partner is present to stand in for them.
    pub(crate) fn merge_object(
        &mut self,
        schema: &Schema,
        delete_missing: bool,
        target: &mut Document,
        patch: &Document,
        path: &str,
    ) -> StateResult<Diff> {
        let mut changes = BTreeMap::new();
        let mut missing_mandatory = Vec::new();

        for (index, (name, desc)) in schema.iter().enumerate() {
            let field_path = join(path, name);
            match patch.get(name) {
                Some(_) if self.superseded(schema, index, desc, target, patch) => {
                    self.trace(&field_path, "skipped, a later exclusive partner takes the group");
                }
                Some(value) => {
                    let outcome = self.merge_field(name, desc, target, value, &field_path)?;
                    if outcome.diff.is_changed() {
                        changes.insert(name.to_string(), outcome.diff);
                    }
                    if outcome.accepted {
                        self.evict_partners(desc, target, &mut changes, path);
                    }
                }
                None if delete_missing => {
                    if desc.is_mandatory() {
                        missing_mandatory.push((name, desc, field_path));
                    } else if target.remove(name).is_some() {
                        self.trace(&field_path, "deleted attribute missing from patch");
                        changes.insert(name.to_string(), Diff::Changed);
                    }
                }
                None => {}
            }
        }

        for (name, desc, field_path) in missing_mandatory {
            if partner_present(desc, target) {
                if target.remove(name).is_some() {
                    self.trace(&field_path, "deleted mandatory attribute replaced by partner");
                    changes.insert(name.to_string(), Diff::Changed);
                }
            } else if !target.contains_key(name) {
                self.report(Violation::MandatoryMissing { path: field_path });
            }
        }

        Ok(Diff::from_changes(changes))
    }

    /// True when a partner declared after this field also carries a value
    /// in the patch that will be accepted; the last accepted member of a
    /// group wins.
    fn superseded(
        &self,
        schema: &Schema,
        index: usize,
        desc: &FieldDescriptor,
        target: &Document,
        patch: &Document,
    ) -> bool {
        desc.exclusive_with().iter().any(|partner| {
            let later = schema.position(partner).is_some_and(|at| at > index);
            match (patch.get(partner), schema.get(partner)) {
                (Some(value), Some(partner_desc)) if later && !value.is_null() => {
                    self.accepts(partner, partner_desc, target, value)
                }
                _ => false,
            }
        })
    }

    /// Merges `value` into a scratch copy of `target` and reports whether
    /// the field would take it.
    fn accepts(&self, name: &str, desc: &FieldDescriptor, target: &Document, value: &Value) -> bool {
        let mut scratch = target.clone();
        let mut dry = MergePass {
            config: self.config,
            mode: self.mode,
            violations: Vec::new(),
            quiet: true,
        };
        dry.merge_field(name, desc, &mut scratch, value, "")
            .is_ok_and(|outcome| outcome.accepted)
    }

    /// Merges one field. In lenient mode a structural error drops the
    /// incoming value and keeps what the state already held.
    pub(crate) fn merge_field(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> StateResult<FieldOutcome> {
        match self.dispatch(name, desc, parent, value, path) {
            Err(err) if self.mode == Mode::Lenient => {
                self.structural(err)?;
                Ok(FieldOutcome::rejected(Diff::Unchanged))
            }
            result => result,
        }
    }

    fn dispatch(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> StateResult<FieldOutcome> {
        if value.is_null() {
            return Ok(self.clear_field(name, desc, parent, path));
        }
        match desc.kind().shape() {
            Shape::Scalar(primitive) => Ok(self.merge_scalar(name, desc, primitive, parent, value, path)),
            Shape::Array(primitive) => Ok(self.merge_array(name, desc, primitive, parent, value, path)),
            Shape::Object => self.merge_nested(name, desc, parent, value, path),
            Shape::ObjectArray => self.merge_object_array(name, desc, parent, value, path),
            Shape::Copy(_) => self.merge_copy(name, desc, parent, value, path),
        }
    }

    fn clear_field(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        path: &str,
    ) -> FieldOutcome {
        if desc.is_mandatory() {
            self.report(Violation::MandatoryDelete {
                path: path.to_string(),
            });
            return FieldOutcome::rejected(Diff::Unchanged);
        }
        let removed = parent.remove(name).is_some();
        if removed {
            self.trace(path, "deleted by null");
        }
        FieldOutcome::rejected(changed_if(removed))
    }

    fn evict_partners(
        &mut self,
        desc: &FieldDescriptor,
        target: &mut Document,
        changes: &mut BTreeMap<String, Diff>,
        path: &str,
    ) {
        for partner in desc.exclusive_with() {
            if target.remove(partner).is_some() {
                self.trace(&join(path, partner), "evicted by exclusive partner");
                changes.insert(partner.clone(), Diff::Changed);
            }
        }
    }

    /// Coerces and constrains a scalar. A rejected value keeps the previous
    /// one; with no previous value the default is written instead, unless
    /// an exclusive partner already holds the group.
    fn merge_scalar(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        primitive: Primitive,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> FieldOutcome {
        let candidate = match coerce(name, Some(value), primitive, None) {
            Ok(candidate) => candidate.map(|v| normalize_case(desc, v)),
            Err(err) => {
                self.report(Violation::InvalidValue {
                    path: path.to_string(),
                    reason: err.to_string(),
                });
                None
            }
        };
        let accepted = match candidate {
            Some(v) if self.within_constraints(desc, &v, path) => Some(v),
            _ => None,
        };

        let resolved = match (&accepted, parent.get(name)) {
            (Some(v), _) => Some(v.clone()),
            (None, Some(_)) => None,
            (None, None) if !partner_present(desc, parent) => {
                coerce(name, None, primitive, desc.default_value())
                    .ok()
                    .flatten()
            }
            (None, None) => None,
        };

        let diff = match resolved {
            Some(v) if parent.get(name) != Some(&v) => {
                parent.insert(name.to_string(), v);
                Diff::Changed
            }
            _ => Diff::Unchanged,
        };
        FieldOutcome {
            diff,
            accepted: accepted.is_some(),
        }
    }

    fn within_constraints(&mut self, desc: &FieldDescriptor, value: &Value, path: &str) -> bool {
        if let Some(n) = value.as_f64() {
            let below = desc.min().is_some_and(|min| n < min);
            let above = desc.max().is_some_and(|max| n > max);
            if below || above {
                self.report(Violation::OutOfRange {
                    path: path.to_string(),
                    value: n,
                    min: desc.min(),
                    max: desc.max(),
                });
                return false;
            }
        }
        if !is_allowed(desc, value) {
            self.report(Violation::NotAllowed {
                path: path.to_string(),
                value: value.clone(),
            });
            return false;
        }
        true
    }

    /// Coerces every element and replaces the whole sequence. Elements that
    /// fail coercion or the allow-list are dropped without a violation.
    fn merge_array(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        primitive: Primitive,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> FieldOutcome {
        let mut kept = Vec::new();
        for (index, item) in as_items(value).iter().enumerate() {
            let coerced = match coerce(name, Some(item), primitive, None) {
                Ok(Some(v)) => normalize_case(desc, v),
                Ok(None) => continue,
                Err(err) => {
                    self.trace(&format!("{path}[{index}]"), &format!("dropped element: {err}"));
                    continue;
                }
            };
            if !is_allowed(desc, &coerced) {
                self.trace(&format!("{path}[{index}]"), "dropped element outside allow-list");
                continue;
            }
            kept.push(coerced);
        }

        let new = Value::Array(kept);
        let diff = if parent.get(name) == Some(&new) {
            Diff::Unchanged
        } else {
            parent.insert(name.to_string(), new);
            Diff::Changed
        };
        FieldOutcome::accepted(diff)
    }

    /// Recurses into a nested object, creating it on first write.
    fn merge_nested(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> StateResult<FieldOutcome> {
        let patch = value
            .as_object()
            .ok_or_else(|| StateError::expected_object(path, value))?;
        let Some(attributes) = desc.attributes() else {
            return Ok(FieldOutcome::rejected(Diff::Unchanged));
        };

        let (mut nested, existed) = match parent.get(name) {
            Some(Value::Object(current)) => (current.clone(), true),
            _ => (Map::new(), false),
        };
        let diff = self.merge_object(
            attributes,
            desc.kind().deletes_missing(),
            &mut nested,
            patch,
            path,
        )?;

        if nested.is_empty() && !existed {
            // Nothing to create; a non-object leftover is discarded.
            let removed = parent.remove(name).is_some();
            return Ok(FieldOutcome::rejected(changed_if(removed)));
        }
        let replaced_other = !existed && parent.contains_key(name);
        parent.insert(name.to_string(), Value::Object(nested));
        Ok(FieldOutcome::accepted(if replaced_other {
            Diff::Changed
        } else {
            diff
        }))
    }

    /// Updates only the keys the container already holds, each merged as
    /// the container's kind without the copy shape.
    fn merge_copy(
        &mut self,
        name: &str,
        desc: &FieldDescriptor,
        parent: &mut Document,
        value: &Value,
        path: &str,
    ) -> StateResult<FieldOutcome> {
        let patch = value
            .as_object()
            .ok_or_else(|| StateError::expected_object(path, value))?;
        let Some(Value::Object(current)) = parent.get(name) else {
            self.trace(path, "copy container absent, nothing to update");
            return Ok(FieldOutcome::rejected(Diff::Unchanged));
        };

        let entry = desc.copied_entry();
        let mut container = current.clone();
        let keys: Vec<String> = container.keys().cloned().collect();
        let mut changes = BTreeMap::new();
        for key in keys {
            let Some(v) = patch.get(&key) else {
                continue;
            };
            let outcome = self.merge_field(&key, &entry, &mut container, v, &join(path, &key))?;
            if outcome.diff.is_changed() {
                changes.insert(key, outcome.diff);
            }
        }

        let diff = Diff::from_changes(changes);
        if diff.is_changed() {
            parent.insert(name.to_string(), Value::Object(container));
        }
        Ok(FieldOutcome::accepted(diff))
    }
}

pub(crate) fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn partner_present(desc: &FieldDescriptor, parent: &Document) -> bool {
    desc.exclusive_with()
        .iter()
        .any(|partner| parent.contains_key(partner))
}

pub(crate) fn changed_if(changed: bool) -> Diff {
    if changed { Diff::Changed } else { Diff::Unchanged }
}

/// Wraps a lone value into a one-element sequence.
pub(crate) fn as_items(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    }
}

/// Equality that treats `2` and `2.0` as the same number.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub(crate) fn normalize_case(desc: &FieldDescriptor, value: Value) -> Value {
    match value {
        Value::String(s) if desc.upper_case() => Value::String(s.to_uppercase()),
        other => other,
    }
}

fn is_allowed(desc: &FieldDescriptor, value: &Value) -> bool {
    desc.values()
        .is_none_or(|allowed| allowed.iter().any(|a| same_value(a, value)))
}
