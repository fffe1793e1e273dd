//! Loose-to-strict value coercion.
//!
//! Inbound commands and user messages carry values in whatever form the
//! sender had at hand: `"on"`, `"75"`, `"#ff8800"`, `1`, `true`, or even a
//! wrapper object `{ "brightness": 75 }`. [`coerce`] maps all of these onto
//! one declared [`Primitive`] or fails with [`Error::InvalidValue`].

use crate::datetime::epoch_millis_to_iso;
use crate::{Error, Primitive, Result};
use serde_json::{Number, Value};

/// Coerces `value` for field `key` to `primitive`.
///
/// A missing value is replaced by `default` (which may itself be missing,
/// yielding `Ok(None)`). An object is unwrapped through its property named
/// `key`, so `{"level": 3}` coerces for field `level` like `3` does.
pub fn coerce(
    key: &str,
    value: Option<&Value>,
    primitive: Primitive,
    default: Option<&Value>,
) -> Result<Option<Value>> {
    let Some(value) = value.or(default) else {
        return Ok(None);
    };

    let coerced = match value {
        Value::String(s) => from_str(key, s, primitive, value)?,
        Value::Number(n) => from_number(key, n, primitive, value)?,
        Value::Bool(b) => from_bool(*b, primitive),
        Value::Object(map) => match map.get(key) {
            Some(inner) => return coerce(key, Some(inner), primitive, None),
            None => return Err(Error::invalid_value(key, primitive, value)),
        },
        Value::Null | Value::Array(_) => return Err(Error::invalid_value(key, primitive, value)),
    };
    Ok(Some(coerced))
}

fn from_str(key: &str, s: &str, primitive: Primitive, raw: &Value) -> Result<Value> {
    let invalid = || Error::invalid_value(key, primitive, raw);
    match primitive {
        Primitive::Bool => {
            if let Some(n) = parse_float_prefix(s) {
                return Ok(Value::Bool(n != 0.0));
            }
            match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            }
        }
        Primitive::Float => parse_float_prefix(s)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        Primitive::Int => {
            let trimmed = s.trim_start();
            let hex;
            let source = match trimmed.strip_prefix('#') {
                Some(rest) => {
                    hex = format!("0x{rest}");
                    hex.as_str()
                }
                None => trimmed,
            };
            parse_int_prefix(source).map(Value::from).ok_or_else(invalid)
        }
        Primitive::String | Primitive::DateTime => Ok(Value::String(s.to_string())),
    }
}

fn from_number(key: &str, n: &Number, primitive: Primitive, raw: &Value) -> Result<Value> {
    let as_f64 = n.as_f64().unwrap_or_default();
    match primitive {
        Primitive::Bool => Ok(Value::Bool(as_f64 != 0.0)),
        Primitive::String => Ok(Value::String(number_to_string(n))),
        Primitive::Int => Ok(Value::from(truncate(n))),
        Primitive::Float => Number::from_f64(as_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::invalid_value(key, primitive, raw)),
        Primitive::DateTime => epoch_millis_to_iso(truncate(n))
            .map(Value::String)
            .ok_or_else(|| Error::invalid_value(key, primitive, raw)),
    }
}

fn from_bool(b: bool, primitive: Primitive) -> Value {
    match primitive {
        Primitive::Bool => Value::Bool(b),
        Primitive::String => Value::String(b.to_string()),
        Primitive::Float => Value::from(if b { 1.0 } else { 0.0 }),
        Primitive::Int | Primitive::DateTime => Value::from(i64::from(b)),
    }
}

fn truncate(n: &Number) -> i64 {
    match n.as_i64() {
        Some(i) => i,
        // Saturating cast: u64 above i64::MAX and huge floats clamp.
        None => n.as_f64().unwrap_or_default().trunc() as i64,
    }
}

/// Formats a number the way it would be written by hand: integral floats
/// lose their fractional part (`3.0` becomes `"3"`).
fn number_to_string(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    let f = n.as_f64().unwrap_or_default();
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Parses the longest leading decimal float, ignoring leading whitespace
/// and any trailing garbage (`"12.5kg"` is `12.5`).
fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse().ok()
}

/// Parses the longest leading integer. A `0x` prefix switches to hex.
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(rest) => (16, rest),
        None => (10, unsigned),
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits[..end], radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
