//! Binding - the variable map threaded through a workflow execution
//!
//! A binding is a string-keyed map of JSON-shaped values. Callees receive a
//! logical copy and return an updated map; the caller decides how to merge.

pub mod path;
pub mod template;

use serde_json::{Map, Value};

/// The variable map threaded through statement execution.
pub type Binding = Map<String, Value>;

/// Key for an activity's request payload in the id-scoped record.
pub const ARGUMENTS_KEY: &str = "arguments";
/// Key for an activity's raw result in the id-scoped record.
pub const RESPONSES_KEY: &str = "responses";

/// Deep-copy a binding.
///
/// `Value` is already a closed JSON sum type, so a structural clone is
/// equivalent to the serialize/parse round trip and keeps no shared
/// references.
pub fn clone_binding(binding: &Binding) -> Binding {
    binding.clone()
}

/// Reparse a value that may carry JSON as text.
///
/// A string holding `"{\"a\":1}"` becomes the object it encodes; anything
/// else is returned as-is. Required-key checks and map coercion both look
/// through this textual layer.
pub fn normalize(value: &Value) -> Value {
    if let Value::String(s) = value {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            return parsed;
        }
    }
    value.clone()
}

/// Coerce any value into a binding.
///
/// Objects map directly; strings are reparsed first. Values that are not
/// object-shaped produce an empty binding - callers decide how to scope
/// them (typically under the composite action key).
pub fn create_map(value: &Value) -> Binding {
    match normalize(value) {
        Value::Object(map) => map,
        _ => Binding::new(),
    }
}

/// Render a value as compact JSON text.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge `src` into `dst`, later keys winning at the top level.
pub fn assign(dst: &mut Binding, src: &Binding) {
    for (k, v) in src {
        dst.insert(k.clone(), v.clone());
    }
}

/// Left-to-right fold of several bindings, later maps winning.
pub fn assign_all(layers: &[&Binding]) -> Binding {
    let mut result = Binding::new();
    for layer in layers {
        assign(&mut result, layer);
    }
    result
}

/// Short type label for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
