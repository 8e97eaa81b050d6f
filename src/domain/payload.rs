// Helpers for the loosely-typed JSON documents the worksheet API exchanges
use serde_json::{Map, Value};

/// Key of the embedded graph list inside a worksheet payload.
pub const GRAPHS_KEY: &str = "graphs";

/// A single field whose stringified value differs between current and desired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// Payload of a worksheet that does not exist remotely yet.
pub fn empty_worksheet_payload() -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(GRAPHS_KEY.to_string(), Value::Array(Vec::new()));
    payload
}

/// Render a JSON value as the plain string used for field comparison.
///
/// Missing values and `null` both become the empty string, and strings are
/// rendered without quotes, so `"0.3"` and `0.3` compare equal.
pub fn value_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// True when a field is missing, null, or an empty string.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Borrow the graph list of a worksheet payload, if it has one.
pub fn graphs(payload: &Map<String, Value>) -> &[Value] {
    payload
        .get(GRAPHS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Mutable access to the graph list, creating an empty one when missing.
pub fn graphs_mut(payload: &mut Map<String, Value>) -> &mut Vec<Value> {
    let entry = payload
        .entry(GRAPHS_KEY.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    match entry {
        Value::Array(list) => list,
        _ => unreachable!("graphs entry was just normalized to an array"),
    }
}
