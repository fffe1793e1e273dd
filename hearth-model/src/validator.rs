use serde_json::Value;

/// Accepts, rejects or canonicalizes the key of a new keyed-array element.
///
/// Consulted only when an incoming element matches no existing one and is
/// about to be appended. Return `None` to drop the element, or the key to
/// store (which may differ from the one supplied, e.g. corrected case).
///
/// Any `Fn(&Value) -> Option<Value>` closure is a validator.
pub trait KeyValidator: Send + Sync {
    fn validate(&self, key: &Value) -> Option<Value>;
}

impl<F> KeyValidator for F
where
    F: Fn(&Value) -> Option<Value> + Send + Sync,
{
    fn validate(&self, key: &Value) -> Option<Value> {
        self(key)
    }
}

/// Accepts only keys from a fixed list.
///
/// Strings match case-insensitively and are rewritten to the listed
/// spelling; numbers match by value.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedKeys {
    keys: Vec<Value>,
}

impl AllowedKeys {
    #[must_use]
    pub fn new(keys: Vec<Value>) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn keys(&self) -> &[Value] {
        &self.keys
    }
}

impl KeyValidator for AllowedKeys {
    fn validate(&self, key: &Value) -> Option<Value> {
        self.keys
            .iter()
            .find(|allowed| match (allowed, key) {
                (Value::String(a), Value::String(k)) => a.eq_ignore_ascii_case(k),
                (Value::Number(a), Value::Number(k)) => a.as_f64() == k.as_f64(),
                (a, k) => *a == k,
            })
            .cloned()
    }
}
