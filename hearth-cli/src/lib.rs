//! File-level operations behind the `hearth` command.
//!
//! Every command reads JSON files, runs the engine and returns a
//! serializable result; printing is left to the binary.

use anyhow::{Context, Result, bail};
use hearth_model::{Document, Schema};
use hearth_state::{MergeReport, Reconciler};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Shape of a validated schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub fields: Vec<String>,
    pub exclusive_groups: Vec<Vec<String>>,
}

/// A state document together with the report that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateOutput {
    pub state: Document,
    pub report: MergeReport,
}

pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text + "\n").with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_schema(path: &Path) -> Result<Schema> {
    let value = read_json(path)?;
    let schema = Schema::from_value(value)
        .with_context(|| format!("Invalid schema in {}", path.display()))?;
    debug!(fields = schema.len(), "schema loaded from {}", path.display());
    Ok(schema)
}

/// Validates a schema file and lists its fields and exclusivity groups.
pub fn check(schema_path: &Path) -> Result<SchemaSummary> {
    let schema = read_schema(schema_path)?;
    Ok(SchemaSummary {
        fields: schema.iter().map(|(name, _)| name.to_string()).collect(),
        exclusive_groups: schema
            .exclusive_groups()
            .into_values()
            .map(|members| members.into_iter().map(str::to_string).collect())
            .collect(),
    })
}

/// Builds the default state for a schema.
pub fn init(reconciler: &Reconciler, schema_path: &Path) -> Result<Document> {
    let schema = read_schema(schema_path)?;
    Ok(reconciler.initial_state(&schema))
}

/// Merges a patch file into a state file, or into the default state when
/// no state file is given. With `in_place` the state file is rewritten.
pub fn merge(
    reconciler: &Reconciler,
    schema_path: &Path,
    state_path: Option<&Path>,
    patch_path: &Path,
    in_place: bool,
) -> Result<StateOutput> {
    let schema = read_schema(schema_path)?;
    let mut state = match state_path {
        Some(path) => match read_json(path)? {
            Value::Object(state) => state,
            _ => bail!("State in {} is not a JSON object", path.display()),
        },
        None => reconciler.initial_state(&schema),
    };
    let patch = read_json(patch_path)?;

    let report = reconciler
        .merge(&schema, &mut state, &patch)
        .with_context(|| format!("Failed to merge {}", patch_path.display()))?;
    info!(
        changed = report.is_changed(),
        violations = report.violations.len(),
        "merged {}",
        patch_path.display()
    );

    if in_place {
        let Some(path) = state_path else {
            bail!("--in-place requires --state");
        };
        if report.is_changed() {
            write_json(path, &state)?;
        }
    }
    Ok(StateOutput { state, report })
}

/// Loads a persisted state file leniently.
pub fn load(reconciler: &Reconciler, schema_path: &Path, state_path: &Path) -> Result<StateOutput> {
    let schema = read_schema(schema_path)?;
    let stored = read_json(state_path)?;
    let (state, report) = reconciler.load(&schema, &stored);
    Ok(StateOutput { state, report })
}
