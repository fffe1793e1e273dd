use crate::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A virtual appliance exposed to the voice assistant.
///
/// Pairs the attribute (capability) document with the live state document.
/// This is the unit the persistence layer stores; its JSON form has no
/// envelope beyond these fields. The state is only ever changed through
/// the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub attributes: Document,
    #[serde(default)]
    pub state: Document,
}

impl Device {
    /// Creates a device with empty attribute and state documents.
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
            ..Self::default()
        }
    }

    /// Looks up a state value by JSON pointer (e.g., "/color/spectrumRgb").
    pub fn state_value(&self, pointer: &str) -> Option<&Value> {
        lookup(&self.state, pointer)
    }

    /// Looks up an attribute value by JSON pointer.
    pub fn attribute(&self, pointer: &str) -> Option<&Value> {
        lookup(&self.attributes, pointer)
    }

    /// Extract a string value from `state` using a JSON pointer.
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.state_value(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `state` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.state_value(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `state` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.state_value(pointer).and_then(|v| v.as_f64())
    }
}

fn lookup<'a>(doc: &'a Document, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix('/')?;
    let (head, tail) = match path.find('/') {
        Some(i) => (&path[..i], &path[i..]),
        None => (path, ""),
    };
    let head = head.replace("~1", "/").replace("~0", "~");
    doc.get(&head)?.pointer(tail)
}
