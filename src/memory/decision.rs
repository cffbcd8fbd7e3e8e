//! Parsing of the JSON decisions returned by the memory decision models.
//!
//! Models wrap their answer in code fences, add prose around it or return a
//! one-element array often enough that parsing is lenient. Anything that
//! still fails yields `None`, which callers treat as IGNORE.

use serde_json::{Map, Value};
use tracing::warn;

use crate::utils::string::{preview, strip_code_fences};

/// A decision object with its upper-cased `decision` field split out.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDecision {
    pub kind: String,
    pub fields: Map<String, Value>,
}

impl RawDecision {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn array_field(&self, key: &str) -> Option<&Vec<Value>> {
        self.fields.get(key).and_then(Value::as_array)
    }
}

/// Parse a model reply into a decision.
pub fn parse_decision(raw: &str) -> Option<RawDecision> {
    let body = strip_code_fences(raw);
    let value = serde_json::from_str::<Value>(body)
        .ok()
        .or_else(|| extract_object(body));

    let Some(value) = value else {
        warn!(raw = %preview(raw, 200), "Decision output is not JSON");
        return None;
    };

    let object = match value {
        Value::Object(map) => map,
        Value::Array(mut items) if items.len() == 1 => match items.pop() {
            Some(Value::Object(map)) => map,
            _ => return None,
        },
        _ => {
            warn!(raw = %preview(raw, 200), "Decision output is not an object");
            return None;
        }
    };

    let kind = object
        .get("decision")
        .and_then(Value::as_str)
        .map(|d| d.trim().to_uppercase())?;

    Some(RawDecision {
        kind,
        fields: object,
    })
}

/// Parse the outermost `{...}` span embedded in surrounding prose.
fn extract_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
