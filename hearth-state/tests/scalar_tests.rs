use hearth_model::{Diff, Document, FieldDescriptor, Schema};
use hearth_state::{Reconciler, Violation, merge};
use hearth_types::{Kind, Primitive};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

fn single(desc: impl Into<FieldDescriptor>) -> Schema {
    Schema::builder().field("f", desc).build().unwrap()
}

// ── Round-trip & idempotence ─────────────────────────────────────

#[test]
fn string_round_trip() {
    let schema = single(Kind::scalar(Primitive::String));
    let mut state = Document::new();

    let diff = merge(&schema, &mut state, &json!({"f": "x"})).unwrap();
    assert_eq!(state, doc(json!({"f": "x"})));
    assert_eq!(diff.changed_fields(), vec!["f"]);

    let again = merge(&schema, &mut state, &json!({"f": "x"})).unwrap();
    assert_eq!(again, Diff::Unchanged);
    assert_eq!(state, doc(json!({"f": "x"})));
}

#[test]
fn unknown_fields_are_ignored() {
    let schema = single(Kind::scalar(Primitive::String));
    let mut state = Document::new();
    let diff = merge(&schema, &mut state, &json!({"other": 1})).unwrap();
    assert_eq!(diff, Diff::Unchanged);
    assert!(state.is_empty());
}

#[test]
fn values_are_coerced_to_declared_primitive() {
    let schema = Schema::builder()
        .field("on", Kind::scalar(Primitive::Bool))
        .field("level", Kind::scalar(Primitive::Int))
        .field("rgb", Kind::scalar(Primitive::Int))
        .field("temp", Kind::scalar(Primitive::Float))
        .field("label", Kind::scalar(Primitive::String))
        .build()
        .unwrap();
    let mut state = Document::new();
    merge(
        &schema,
        &mut state,
        &json!({"on": "yes", "level": 42.9, "rgb": "#ff0000", "temp": "21.5", "label": 7}),
    )
    .unwrap();
    assert_eq!(
        state,
        doc(json!({"on": true, "level": 42, "rgb": 16_711_680, "temp": 21.5, "label": "7"}))
    );
}

#[test]
fn wrapper_object_is_unwrapped() {
    let schema = single(Kind::scalar(Primitive::Int));
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": {"f": "12"}})).unwrap();
    assert_eq!(state["f"], json!(12));
}

#[test]
fn equal_number_is_not_a_change() {
    let schema = single(Kind::scalar(Primitive::Int));
    let mut state = doc(json!({"f": 3}));
    let diff = merge(&schema, &mut state, &json!({"f": "3"})).unwrap();
    assert_eq!(diff, Diff::Unchanged);
}

// ── Deletion ─────────────────────────────────────────────────────

#[test]
fn null_deletes_optional_field() {
    let schema = single(Kind::scalar(Primitive::Int));
    let mut state = doc(json!({"f": 1}));
    let diff = merge(&schema, &mut state, &json!({"f": null})).unwrap();
    assert!(diff.contains("f"));
    assert!(state.is_empty());

    let again = merge(&schema, &mut state, &json!({"f": null})).unwrap();
    assert_eq!(again, Diff::Unchanged);
}

#[test]
fn mandatory_field_refuses_deletion() {
    let schema = single(Kind::scalar(Primitive::Bool).mandatory());
    let mut state = doc(json!({"f": true}));
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"f": null}))
        .unwrap();
    assert_eq!(state, doc(json!({"f": true})));
    assert_eq!(report.diff, Diff::Unchanged);
    assert_eq!(
        report.violations,
        vec![Violation::MandatoryDelete { path: "f".into() }]
    );
}

// ── Constraints ──────────────────────────────────────────────────

#[test]
fn out_of_range_keeps_previous_value() {
    let schema = single(FieldDescriptor::scalar(Primitive::Int).with_range(0.0, 100.0));
    let mut state = doc(json!({"f": 40}));
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"f": 150}))
        .unwrap();
    assert_eq!(state["f"], json!(40));
    assert!(!report.is_changed());
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::OutOfRange { value, min: Some(min), max: Some(max), .. }]
            if *value == 150.0 && *min == 0.0 && *max == 100.0
    ));
}

#[test]
fn out_of_range_without_previous_falls_back_to_default() {
    let schema = single(
        FieldDescriptor::scalar(Primitive::Int)
            .with_range(0.0, 100.0)
            .with_default(json!(10)),
    );
    let mut state = Document::new();
    let diff = merge(&schema, &mut state, &json!({"f": 150})).unwrap();
    assert_eq!(state["f"], json!(10));
    assert!(diff.contains("f"));
}

#[test]
fn out_of_range_without_previous_or_default_stays_absent() {
    let schema = single(FieldDescriptor::scalar(Primitive::Int).with_max(100.0));
    let mut state = Document::new();
    let diff = merge(&schema, &mut state, &json!({"f": 150})).unwrap();
    assert!(state.is_empty());
    assert_eq!(diff, Diff::Unchanged);
}

#[test]
fn bounds_are_inclusive() {
    let schema = single(FieldDescriptor::scalar(Primitive::Float).with_range(0.0, 100.0));
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": 100})).unwrap();
    assert_eq!(state["f"], json!(100.0));
}

#[test]
fn allow_list_keeps_previous_value() {
    let schema = single(
        FieldDescriptor::scalar(Primitive::String).with_values(vec![json!("A"), json!("B")]),
    );
    let mut state = doc(json!({"f": "A"}));
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"f": "C"}))
        .unwrap();
    assert_eq!(state["f"], json!("A"));
    assert_eq!(
        report.violations,
        vec![Violation::NotAllowed { path: "f".into(), value: json!("C") }]
    );
}

#[test]
fn allow_list_falls_back_to_default_when_unset() {
    let schema = single(
        FieldDescriptor::scalar(Primitive::String)
            .with_values(vec![json!("A"), json!("B")])
            .with_default(json!("A")),
    );
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": "C"})).unwrap();
    assert_eq!(state["f"], json!("A"));
}

#[test]
fn upper_case_applies_before_allow_list() {
    let schema = single(
        FieldDescriptor::scalar(Primitive::String)
            .with_values(vec![json!("UP"), json!("DOWN")])
            .with_upper_case(),
    );
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": "down"})).unwrap();
    assert_eq!(state["f"], json!("DOWN"));
}

#[test]
fn invalid_value_is_reported_and_siblings_still_apply() {
    let schema = Schema::builder()
        .field("on", Kind::scalar(Primitive::Bool))
        .field("level", Kind::scalar(Primitive::Int))
        .build()
        .unwrap();
    let mut state = doc(json!({"on": false}));
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"on": "maybe", "level": 5}))
        .unwrap();
    assert_eq!(state, doc(json!({"on": false, "level": 5})));
    assert_eq!(report.diff.changed_fields(), vec!["level"]);
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::InvalidValue { path, .. }] if path == "on"
    ));
}

// ── Primitive arrays ─────────────────────────────────────────────

#[test]
fn primitive_array_replaces_and_drops_invalid_elements() {
    let schema = single(
        FieldDescriptor::new(Kind::array(Primitive::String))
            .with_values(vec![json!("eco"), json!("boost")]),
    );
    let mut state = doc(json!({"f": ["eco"]}));
    let diff = merge(&schema, &mut state, &json!({"f": ["boost", "turbo", "eco"]})).unwrap();
    assert_eq!(state["f"], json!(["boost", "eco"]));
    assert!(diff.contains("f"));

    let again = merge(&schema, &mut state, &json!({"f": ["boost", "turbo", "eco"]})).unwrap();
    assert_eq!(again, Diff::Unchanged);
}

#[test]
fn lone_value_is_wrapped_into_array() {
    let schema = single(Kind::array(Primitive::Int));
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": "7"})).unwrap();
    assert_eq!(state["f"], json!([7]));
}

#[test]
fn primitive_array_elements_are_coerced() {
    let schema = single(Kind::array(Primitive::Int));
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"f": [1.9, "2", "x", true]})).unwrap();
    assert_eq!(state["f"], json!([1, 2, 1]));
}

// ── Violations config ────────────────────────────────────────────

#[test]
fn violations_can_be_left_out_of_report() {
    let schema = single(Kind::scalar(Primitive::Bool).mandatory());
    let reconciler = Reconciler::new(hearth_state::ReconcilerConfig {
        record_violations: false,
        ..Default::default()
    });
    let mut state = doc(json!({"f": true}));
    let report = reconciler.merge(&schema, &mut state, &json!({"f": null})).unwrap();
    assert!(report.violations.is_empty());
}
