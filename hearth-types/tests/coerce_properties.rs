//! Property-based tests for coercion.
//!
//! Coercing an already-typed value must be a fixed point: feeding the output
//! of `coerce` back in yields the same value. The state engine relies on this
//! to keep repeated merges idempotent.

use hearth_types::{Kind, Primitive, coerce};
use proptest::prelude::*;
use serde_json::{Value, json};

fn primitive_strategy() -> impl Strategy<Value = Primitive> {
    prop_oneof![
        Just(Primitive::Bool),
        Just(Primitive::Int),
        Just(Primitive::Float),
        Just(Primitive::String),
        Just(Primitive::DateTime),
    ]
}

fn input_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
        prop::string::string_regex("[a-zA-Z0-9#. ]{0,12}")
            .unwrap()
            .prop_map(Value::from),
    ]
}

proptest! {
    /// coerce(coerce(v)) == coerce(v) whenever the first pass succeeds.
    #[test]
    fn coercion_is_a_fixed_point(value in input_strategy(), primitive in primitive_strategy()) {
        // Booleans become 0/1 for datetimes, which then read as epoch millis.
        prop_assume!(!(primitive == Primitive::DateTime && value.is_boolean()));
        if let Ok(Some(first)) = coerce("f", Some(&value), primitive, None) {
            let second = coerce("f", Some(&first), primitive, None).unwrap();
            prop_assert_eq!(second, Some(first));
        }
    }

    /// Wrapping a value in `{key: value}` never changes the outcome.
    #[test]
    fn wrapper_object_is_transparent(value in input_strategy(), primitive in primitive_strategy()) {
        let direct = coerce("level", Some(&value), primitive, None);
        let wrapped = coerce("level", Some(&json!({ "level": value })), primitive, None);
        prop_assert_eq!(direct, wrapped);
    }

    /// Every legal mask survives a decode/encode cycle.
    #[test]
    fn legal_masks_round_trip(mask in 0u32..1024) {
        if let Ok(kind) = Kind::from_bits(mask) {
            prop_assert_eq!(Kind::from_bits(kind.bits()), Ok(kind));
        }
    }
}
