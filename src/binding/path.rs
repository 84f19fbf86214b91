//! Dotted-path accessor - minimal subset
//!
//! Supports:
//! - a.b.c (dot notation)
//! - a[0].b (array index)
//! - items.0 (numeric segment as index)
//!
//! Does NOT support filters, wildcards, or slices. Writes create
//! intermediate objects as needed.

use serde_json::{Map, Value};

use crate::binding::Binding;
use crate::error::{PlaitError, Result};

/// Whether a default-map write overwrites existing paths or only fills
/// missing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Overwrite unconditionally.
    Force,
    /// Write only when the path does not yet resolve.
    Fallback,
}

/// A parsed path segment
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

/// Parse a dotted path into segments
///
/// Examples:
/// - "price.currency" → [Field("price"), Field("currency")]
/// - "items[0].name" → [Field("items"), Index(0), Field("name")]
pub fn parse(path: &str) -> Result<Vec<Segment>> {
    if path.is_empty() {
        return Err(PlaitError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".to_string(),
        });
    }

    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            return Err(PlaitError::InvalidPath {
                path: path.to_string(),
                reason: "empty segment".to_string(),
            });
        }

        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }

            if !part.ends_with(']') {
                return Err(PlaitError::InvalidPath {
                    path: path.to_string(),
                    reason: "unterminated index".to_string(),
                });
            }

            let index_str = &part[bracket_pos + 1..part.len() - 1];
            let index: usize = index_str.parse().map_err(|_| PlaitError::InvalidPath {
                path: path.to_string(),
                reason: format!("invalid index '{}'", index_str),
            })?;

            segments.push(Segment::Index(index));
        } else if let Ok(index) = part.parse::<usize>() {
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Field(part.to_string()));
        }
    }

    Ok(segments)
}

/// Check whether a path resolves in the value.
pub fn exists(root: &Value, path: &str) -> bool {
    get(root, path).is_some()
}

/// Resolve a path to its value, if present.
pub fn get(root: &Value, path: &str) -> Option<Value> {
    let segments = parse(path).ok()?;
    let mut current = root;
    for segment in &segments {
        current = match segment {
            Segment::Field(name) => current.get(name)?,
            Segment::Index(idx) => current.get(*idx)?,
        };
    }
    Some(current.clone())
}

/// Write a value at a path, creating intermediate objects as needed.
///
/// Under [`Policy::Fallback`] an already-resolving path is left untouched.
/// Force-descending through a scalar replaces it with an object; indexing
/// past the end of an array is an error.
pub fn set(root: &mut Value, path: &str, value: Value, policy: Policy) -> Result<()> {
    if policy == Policy::Fallback && exists(root, path) {
        return Ok(());
    }

    let segments = parse(path)?;
    let Some((last, prefix)) = segments.split_last() else {
        return Err(PlaitError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".to_string(),
        });
    };

    let mut current = root;
    for segment in prefix {
        current = descend_or_create(current, segment, path)?;
    }

    match last {
        Segment::Field(name) => {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(Map::new());
            }
            if let Value::Object(map) = current {
                map.insert(name.clone(), value);
            }
            Ok(())
        }
        Segment::Index(idx) => match current {
            Value::Array(items) if *idx < items.len() => {
                items[*idx] = value;
                Ok(())
            }
            _ => Err(PlaitError::InvalidPath {
                path: path.to_string(),
                reason: format!("index {} out of range", idx),
            }),
        },
    }
}

fn descend_or_create<'a>(
    current: &'a mut Value,
    segment: &Segment,
    path: &str,
) -> Result<&'a mut Value> {
    match segment {
        Segment::Field(name) => {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else {
                unreachable!("just replaced with an object");
            };
            Ok(map
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new())))
        }
        Segment::Index(idx) => match current {
            Value::Array(items) if *idx < items.len() => Ok(&mut items[*idx]),
            _ => Err(PlaitError::InvalidPath {
                path: path.to_string(),
                reason: format!("index {} out of range", idx),
            }),
        },
    }
}

/// Apply a map of `path → value` defaults to a binding.
///
/// When any individual path write fails, the whole map is re-applied as a
/// flat top-level merge with the same policy.
pub fn apply_defaults(binding: &Binding, defaults: &Binding, policy: Policy) -> Binding {
    if defaults.is_empty() {
        return binding.clone();
    }

    let mut root = Value::Object(binding.clone());
    for (key, value) in defaults {
        if set(&mut root, key, value.clone(), policy).is_err() {
            return flat_merge(binding, defaults, policy);
        }
    }

    match root {
        Value::Object(map) => map,
        _ => flat_merge(binding, defaults, policy),
    }
}

/// Top-level key merge used as the fallback when path writes fail.
fn flat_merge(binding: &Binding, defaults: &Binding, policy: Policy) -> Binding {
    let mut result = binding.clone();
    for (key, value) in defaults {
        match policy {
            Policy::Force => {
                result.insert(key.clone(), value.clone());
            }
            Policy::Fallback => {
                if !result.contains_key(key) {
                    result.insert(key.clone(), value.clone());
                }
            }
        }
    }
    result
}
