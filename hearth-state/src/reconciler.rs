//! The engine entry point.

use crate::pass::{MergePass, Mode, join};
use crate::{StateError, StateResult, Violation};
use hearth_model::{Device, Diff, Document, FieldDescriptor, Schema};
use hearth_types::{Shape, coerce};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Device identifier attached to every log line.
    pub device_id: String,
    /// Whether violations are collected into the [`MergeReport`] in
    /// addition to being logged.
    pub record_violations: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            device_id: "device".to_string(),
            record_violations: true,
        }
    }
}

/// Outcome of one merge call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    /// What changed in the state document.
    pub diff: Diff,
    /// Recoverable problems met on the way, in the order they occurred.
    pub violations: Vec<Violation>,
}

impl MergeReport {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.diff.is_changed()
    }
}

/// Validates, coerces and merges patches into state documents.
///
/// The reconciler holds no per-device data: the caller owns the schema and
/// the state document and passes both on every call. Calls for one device
/// must be serialized by the caller; calls for different devices are
/// independent.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Merges `patch` into `state` and reports what changed.
    ///
    /// Fields the schema does not declare are ignored. Recoverable problems
    /// are logged and reported as violations while the rest of the patch is
    /// applied. Structural errors abort the call and leave `state` exactly
    /// as it was.
    pub fn merge(
        &self,
        schema: &Schema,
        state: &mut Document,
        patch: &Value,
    ) -> StateResult<MergeReport> {
        let patch = patch
            .as_object()
            .ok_or_else(|| StateError::expected_object("", patch))?;

        let mut working = state.clone();
        let mut pass = MergePass::new(&self.config, Mode::Strict);
        let diff = pass.merge_object(schema, false, &mut working, patch, "")?;
        *state = working;

        if diff.is_changed() {
            debug!(device = %self.config.device_id, changed = ?diff.paths(), "state merged");
        }
        Ok(MergeReport {
            diff,
            violations: pass.into_violations(),
        })
    }

    /// Parses `json` and merges it.
    pub fn merge_json(
        &self,
        schema: &Schema,
        state: &mut Document,
        json: &str,
    ) -> StateResult<MergeReport> {
        let patch: Value = serde_json::from_str(json)?;
        self.merge(schema, state, &patch)
    }

    /// Merges `patch` into the device's state, logging under the device id.
    pub fn apply(
        &self,
        schema: &Schema,
        device: &mut Device,
        patch: &Value,
    ) -> StateResult<MergeReport> {
        let reconciler = Self::new(ReconcilerConfig {
            device_id: device.id.clone(),
            ..self.config.clone()
        });
        reconciler.merge(schema, &mut device.state, patch)
    }

    /// Builds the state a freshly created device starts with.
    ///
    /// Scalars take their coerced default. Objects are built recursively
    /// and kept when non-empty. Arrays and copy containers take their
    /// default when one is declared; mandatory arrays without one start
    /// empty. Within an exclusivity group the first member declared with a
    /// default wins.
    pub fn initial_state(&self, schema: &Schema) -> Document {
        let mut pass = MergePass::new(&self.config, Mode::Lenient);
        let state = self.defaults(&mut pass, schema, "");
        for violation in pass.into_violations() {
            debug!(device = %self.config.device_id, "invalid default: {violation}");
        }
        state
    }

    fn defaults(&self, pass: &mut MergePass<'_>, schema: &Schema, path: &str) -> Document {
        let mut doc = Map::new();
        for (name, desc) in schema.iter() {
            if desc.exclusive_with().iter().any(|p| doc.contains_key(p)) {
                continue;
            }
            let field_path = join(path, name);
            match desc.kind().shape() {
                Shape::Scalar(primitive) => {
                    match coerce(name, None, primitive, desc.default_value()) {
                        Ok(Some(value)) => {
                            doc.insert(name.to_string(), value);
                        }
                        Ok(None) => {}
                        Err(err) => warn!(
                            device = %self.config.device_id,
                            path = %field_path,
                            "ignoring default: {err}"
                        ),
                    }
                }
                Shape::Object => {
                    if let Some(default) = desc.default_value() {
                        self.seed(pass, name, desc, &mut doc, default, &field_path);
                    } else if let Some(attributes) = desc.attributes() {
                        let nested = self.defaults(pass, attributes, &field_path);
                        if !nested.is_empty() {
                            doc.insert(name.to_string(), Value::Object(nested));
                        }
                    }
                }
                Shape::Copy(_) => {
                    if let Some(Value::Object(default)) = desc.default_value() {
                        doc.insert(name.to_string(), Value::Object(default.clone()));
                    }
                }
                Shape::Array(_) | Shape::ObjectArray => {
                    if let Some(default) = desc.default_value() {
                        self.seed(pass, name, desc, &mut doc, default, &field_path);
                    }
                    if desc.is_mandatory() && !doc.contains_key(name) {
                        doc.insert(name.to_string(), Value::Array(Vec::new()));
                    }
                }
            }
        }
        doc
    }

    /// Writes a structured default through the merge path so it is
    /// validated like any patch.
    fn seed(
        &self,
        pass: &mut MergePass<'_>,
        name: &str,
        desc: &FieldDescriptor,
        doc: &mut Document,
        default: &Value,
        path: &str,
    ) {
        if let Err(err) = pass.merge_field(name, desc, doc, default, path) {
            warn!(device = %self.config.device_id, path, "ignoring default: {err}");
        }
    }

    /// Loads a persisted state document.
    ///
    /// Starts from [`initial_state`](Self::initial_state) and merges the
    /// stored document over it, dropping anything that does not fit the
    /// schema instead of failing. A root that is not an object yields the
    /// defaults.
    pub fn load(&self, schema: &Schema, stored: &Value) -> (Document, MergeReport) {
        let defaults = self.initial_state(schema);
        let Some(stored) = stored.as_object() else {
            warn!(
                device = %self.config.device_id,
                "stored state is not an object, starting from defaults"
            );
            return (defaults, MergeReport::default());
        };

        let mut state = defaults.clone();
        let mut pass = MergePass::new(&self.config, Mode::Lenient);
        match pass.merge_object(schema, false, &mut state, stored, "") {
            Ok(diff) => {
                let report = MergeReport {
                    diff,
                    violations: pass.into_violations(),
                };
                (state, report)
            }
            Err(err) => {
                warn!(device = %self.config.device_id, "discarding stored state: {err}");
                (defaults, MergeReport::default())
            }
        }
    }

    /// Re-derives `state` under a new schema after the device's trait set
    /// changed. Fields the new schema no longer declares are dropped, new
    /// fields take their defaults. The report diffs against the old
    /// document.
    pub fn rebuild(&self, schema: &Schema, state: &Document) -> (Document, MergeReport) {
        let (rebuilt, loaded) = self.load(schema, &Value::Object(state.clone()));
        let report = MergeReport {
            diff: Diff::between(state, &rebuilt),
            violations: loaded.violations,
        };
        (rebuilt, report)
    }
}

/// Merges `patch` into `state` with the default configuration.
pub fn merge(schema: &Schema, state: &mut Document, patch: &Value) -> StateResult<Diff> {
    Reconciler::default()
        .merge(schema, state, patch)
        .map(|report| report.diff)
}
