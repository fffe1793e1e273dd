use hearth_model::{AllowedKeys, Diff, Document, FieldDescriptor, Schema};
use hearth_state::{Reconciler, StateError, Violation, merge};
use hearth_types::{Kind, Primitive};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

fn entry_attributes() -> Schema {
    Schema::builder()
        .field("name", Kind::scalar(Primitive::String))
        .field("v", Kind::scalar(Primitive::Int))
        .build()
        .unwrap()
}

fn keyed(replace_all: bool) -> Schema {
    Schema::builder()
        .field(
            "items",
            FieldDescriptor::object_array(entry_attributes())
                .with_key("name")
                .with_add_if_missing(true)
                .with_replace_all(replace_all),
        )
        .build()
        .unwrap()
}

// ── Keyed upsert ─────────────────────────────────────────────────

#[test]
fn keyed_upsert_creates_then_updates_in_place() {
    let schema = keyed(false);
    let mut state = Document::new();

    let diff = merge(&schema, &mut state, &json!({"items": [{"name": "x", "v": 1}]})).unwrap();
    assert!(diff.contains("items"));
    assert_eq!(state["items"], json!([{"name": "x", "v": 1}]));

    let diff = merge(&schema, &mut state, &json!({"items": [{"name": "x", "v": 2}]})).unwrap();
    assert!(diff.contains("items"));
    assert_eq!(state["items"], json!([{"name": "x", "v": 2}]));
}

#[test]
fn keyed_merge_appends_when_not_replacing() {
    let schema = keyed(false);
    let mut state = doc(json!({"items": [{"name": "x", "v": 2}]}));
    merge(&schema, &mut state, &json!({"items": [{"name": "y", "v": 3}]})).unwrap();
    assert_eq!(
        state["items"],
        json!([{"name": "x", "v": 2}, {"name": "y", "v": 3}])
    );
}

#[test]
fn keyed_merge_drops_untouched_when_replacing() {
    let schema = keyed(true);
    let mut state = doc(json!({"items": [{"name": "x", "v": 2}]}));
    merge(&schema, &mut state, &json!({"items": [{"name": "y", "v": 3}]})).unwrap();
    assert_eq!(state["items"], json!([{"name": "y", "v": 3}]));
}

#[test]
fn keyed_replace_keeps_matched_fields() {
    let schema = keyed(true);
    let mut state = doc(json!({"items": [{"name": "x", "v": 2}, {"name": "y", "v": 3}]}));
    merge(&schema, &mut state, &json!({"items": [{"name": "y"}, {"name": "x"}]})).unwrap();
    assert_eq!(
        state["items"],
        json!([{"name": "y", "v": 3}, {"name": "x", "v": 2}])
    );
}

#[test]
fn repeated_key_in_one_patch_merges_into_same_element() {
    let schema = keyed(true);
    let mut state = Document::new();
    merge(
        &schema,
        &mut state,
        &json!({"items": [{"name": "x", "v": 1}, {"name": "x", "v": 2}]}),
    )
    .unwrap();
    assert_eq!(state["items"], json!([{"name": "x", "v": 2}]));
}

#[test]
fn reapplying_keyed_patch_is_unchanged() {
    let schema = keyed(false);
    let mut state = Document::new();
    let patch = json!({"items": [{"name": "x", "v": 1}, {"name": "y", "v": 2}]});
    merge(&schema, &mut state, &patch).unwrap();
    let again = merge(&schema, &mut state, &patch).unwrap();
    assert_eq!(again, Diff::Unchanged);
}

#[test]
fn add_if_missing_false_drops_unknown_keys() {
    let schema = Schema::builder()
        .field(
            "items",
            FieldDescriptor::object_array(entry_attributes())
                .with_key("name")
                .with_add_if_missing(false),
        )
        .build()
        .unwrap();
    let mut state = doc(json!({"items": [{"name": "x", "v": 1}]}));
    let diff = merge(
        &schema,
        &mut state,
        &json!({"items": [{"name": "y", "v": 3}, {"name": "x", "v": 5}]}),
    )
    .unwrap();
    assert_eq!(state["items"], json!([{"name": "x", "v": 5}]));
    assert!(diff.contains("items"));
}

#[test]
fn ambiguous_key_is_rejected() {
    let schema = keyed(false);
    let mut state = doc(json!({"items": [{"name": "x", "v": 1}, {"name": "x", "v": 2}]}));
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"items": [{"name": "x", "v": 9}]}))
        .unwrap();
    assert_eq!(
        state["items"],
        json!([{"name": "x", "v": 1}, {"name": "x", "v": 2}])
    );
    assert_eq!(
        report.violations,
        vec![Violation::AmbiguousKey { path: "items[0]".into(), key: json!("x") }]
    );
}

#[test]
fn element_without_key_is_rejected() {
    let schema = keyed(false);
    let mut state = Document::new();
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"items": [{"v": 1}]}))
        .unwrap();
    assert!(state.is_empty());
    assert_eq!(
        report.violations,
        vec![Violation::InvalidKey { path: "items[0]".into(), key: Value::Null }]
    );
}

#[test]
fn composite_key_matches_on_all_fields() {
    let attributes = Schema::builder()
        .field("name", Kind::scalar(Primitive::String))
        .field("unit", Kind::scalar(Primitive::String))
        .field("value", Kind::scalar(Primitive::Float))
        .build()
        .unwrap();
    let schema = Schema::builder()
        .field(
            "sensors",
            FieldDescriptor::object_array(attributes).with_composite_key(["name", "unit"]),
        )
        .build()
        .unwrap();
    let mut state = doc(json!({"sensors": [
        {"name": "temp", "unit": "C", "value": 20.0},
        {"name": "temp", "unit": "F", "value": 68.0}
    ]}));
    merge(
        &schema,
        &mut state,
        &json!({"sensors": {"name": "temp", "unit": "F", "value": "70"}}),
    )
    .unwrap();
    assert_eq!(
        state["sensors"],
        json!([
            {"name": "temp", "unit": "C", "value": 20.0},
            {"name": "temp", "unit": "F", "value": 70.0}
        ])
    );
}

// ── Key validation ───────────────────────────────────────────────

fn rooms() -> Schema {
    Schema::builder()
        .field(
            "rooms",
            FieldDescriptor::object_array(entry_attributes())
                .with_key("name")
                .with_key_validator(AllowedKeys::new(vec![json!("Kitchen"), json!("Hall")])),
        )
        .build()
        .unwrap()
}

#[test]
fn validator_canonicalizes_new_keys() {
    let schema = rooms();
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"rooms": [{"name": "kitchen", "v": 1}]})).unwrap();
    assert_eq!(state["rooms"], json!([{"name": "Kitchen", "v": 1}]));

    merge(&schema, &mut state, &json!({"rooms": [{"name": "KITCHEN", "v": 2}]})).unwrap();
    assert_eq!(state["rooms"], json!([{"name": "Kitchen", "v": 2}]));
}

#[test]
fn validator_rejects_unknown_keys() {
    let schema = rooms();
    let mut state = Document::new();
    let report = Reconciler::default()
        .merge(&schema, &mut state, &json!({"rooms": [{"name": "Garage", "v": 1}]}))
        .unwrap();
    assert!(state.is_empty());
    assert_eq!(
        report.violations,
        vec![Violation::InvalidKey { path: "rooms[0]".into(), key: json!("Garage") }]
    );
}

#[test]
fn closure_validator_may_rewrite_keys() {
    let schema = Schema::builder()
        .field(
            "rooms",
            FieldDescriptor::object_array(entry_attributes())
                .with_key("name")
                .with_key_validator(|key: &Value| key.as_str().map(|s| Value::from(s.trim()))),
        )
        .build()
        .unwrap();
    let mut state = Document::new();
    merge(&schema, &mut state, &json!({"rooms": [{"name": "  den ", "v": 1}]})).unwrap();
    assert_eq!(state["rooms"], json!([{"name": "den", "v": 1}]));
}

// ── Positional arrays ────────────────────────────────────────────

fn positional() -> Schema {
    Schema::builder()
        .field("slots", FieldDescriptor::object_array(entry_attributes()))
        .build()
        .unwrap()
}

#[test]
fn positional_merge_targets_same_index() {
    let schema = positional();
    let mut state = doc(json!({"slots": [{"name": "a", "v": 1}, {"name": "b", "v": 2}]}));
    merge(&schema, &mut state, &json!({"slots": [{"v": 10}, {"v": 20}, {"name": "c"}]})).unwrap();
    assert_eq!(
        state["slots"],
        json!([{"name": "a", "v": 10}, {"name": "b", "v": 20}, {"name": "c"}])
    );
}

#[test]
fn positional_replace_drops_extra_old_elements() {
    let schema = positional();
    let mut state = doc(json!({"slots": [{"name": "a"}, {"name": "b"}]}));
    let diff = merge(&schema, &mut state, &json!({"slots": [{"v": 1}]})).unwrap();
    assert_eq!(state["slots"], json!([{"name": "a", "v": 1}]));
    assert!(diff.contains("slots"));
}

#[test]
fn emptied_element_is_removed() {
    let schema = Schema::builder()
        .field(
            "slots",
            FieldDescriptor::object_array(entry_attributes()).with_replace_all(false),
        )
        .build()
        .unwrap();
    let mut state = doc(json!({"slots": [{"name": "a"}, {"name": "b"}]}));
    merge(&schema, &mut state, &json!({"slots": [{"name": null}]})).unwrap();
    assert_eq!(state["slots"], json!([{"name": "b"}]));
}

#[test]
fn empty_result_removes_optional_field() {
    let schema = positional();
    let mut state = doc(json!({"slots": [{"name": "a"}]}));
    let diff = merge(&schema, &mut state, &json!({"slots": []})).unwrap();
    assert!(state.is_empty());
    assert!(diff.contains("slots"));
}

#[test]
fn empty_result_keeps_mandatory_field() {
    let schema = Schema::builder()
        .field(
            "slots",
            FieldDescriptor::new(Kind::object_array().mandatory()).with_attributes(entry_attributes()),
        )
        .build()
        .unwrap();
    let mut state = doc(json!({"slots": [{"name": "a"}]}));
    merge(&schema, &mut state, &json!({"slots": []})).unwrap();
    assert_eq!(state["slots"], json!([]));
}

#[test]
fn non_object_element_aborts_merge() {
    let schema = positional();
    let before = doc(json!({"slots": [{"name": "a"}]}));
    let mut state = before.clone();
    let err = merge(&schema, &mut state, &json!({"slots": [{"v": 1}, 5]})).unwrap_err();
    assert!(matches!(
        err,
        StateError::ExpectedObject { ref path, found: "number" } if path == "slots[1]"
    ));
    assert_eq!(state, before);
}
