//! Template Resolution - `{{path}}` substitution
//!
//! Single-pass resolution with Cow<str> for zero-alloc when no templates.
//! Whitespace inside `{{ ... }}` is trimmed before the path resolves.
//! Unresolved placeholders are kept verbatim so a later binding layer can
//! still substitute them.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::binding::Binding;

/// Pre-compiled regex for {{path}} placeholders, whitespace-tolerant.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}\s][^{}]*?)\s*\}\}").unwrap());

/// Matches a template that is exactly one placeholder.
static FULL_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*([^{}\s][^{}]*?)\s*\}\}$").unwrap());

/// Resolve a dotted path against a binding.
///
/// A literal top-level key wins over traversal, so bindings that carry
/// pre-flattened keys like `"name.age"` resolve the same way nested maps
/// do.
pub fn lookup_path<'a>(binding: &'a Binding, path: &str) -> Option<&'a Value> {
    if let Some(value) = binding.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = binding.get(first)?;
    for segment in parts {
        current = match segment.parse::<usize>() {
            Ok(idx) => current.get(idx)?,
            Err(_) => current.get(segment)?,
        };
    }
    Some(current)
}

/// Resolve all `{{path}}` placeholders in a template string.
///
/// Returns Cow::Borrowed when the template has no placeholders. Missing
/// paths keep their placeholder text. Values substituted inside a JSON
/// string context are escaped.
pub fn render<'a>(template: &'a str, binding: &Binding) -> Cow<'a, str> {
    if !template.contains("{{") {
        return Cow::Borrowed(template);
    }

    let mut result = String::with_capacity(template.len() + 64);
    let mut last_end = 0;

    for cap in PLACEHOLDER_RE.captures_iter(template) {
        let m = cap.get(0).unwrap();
        let path = &cap[1];

        result.push_str(&template[last_end..m.start()]);

        match lookup_path(binding, path) {
            Some(value) => {
                let replacement = value_to_string(value);
                if is_in_json_context(template, m.start()) {
                    result.push_str(&escape_for_json(&replacement));
                } else {
                    result.push_str(&replacement);
                }
            }
            None => result.push_str(m.as_str()),
        }

        last_end = m.end();
    }

    result.push_str(&template[last_end..]);
    Cow::Owned(result)
}

/// Resolve a template to a typed value.
///
/// A template that is exactly one placeholder substitutes the bound value
/// with its type intact (numbers stay numbers); anything else renders to a
/// string.
pub fn render_value(template: &str, binding: &Binding) -> Value {
    if let Some(cap) = FULL_PLACEHOLDER_RE.captures(template.trim()) {
        if let Some(value) = lookup_path(binding, &cap[1]) {
            return value.clone();
        }
    }
    Value::String(render(template, binding).into_owned())
}

/// Interpolate every string value in a map, recursing into nested
/// structures. Single-placeholder strings keep the bound value's type.
pub fn render_map(map: &Binding, binding: &Binding) -> Binding {
    map.iter()
        .map(|(k, v)| (k.clone(), render_nested(v, binding)))
        .collect()
}

fn render_nested(value: &Value, binding: &Binding) -> Value {
    match value {
        Value::String(s) => render_value(s, binding),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_nested(v, binding)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| render_nested(v, binding)).collect())
        }
        other => other.clone(),
    }
}

/// Convert a value to its template substitution text.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects, arrays, and null render as compact JSON.
        other => other.to_string(),
    }
}

/// Check if position is inside a JSON string
fn is_in_json_context(template: &str, pos: usize) -> bool {
    let before = &template[..pos];
    let mut in_string = false;
    let mut escaped = false;

    for ch in before.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }

    in_string
}

/// Escape for JSON string context
fn escape_for_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}
