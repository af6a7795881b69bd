//! Field paths into JSON documents
//!
//! Paths are dot separated (`data.items`), optionally prefixed with `$.`, and
//! may index arrays (`items[0]`, `items[-1]`). Paths containing a wildcard are
//! evaluated with jsonpath-rust.

use crate::error::{Error, Result};
use serde_json::Value;

/// Borrow the value at a simple path
///
/// An empty path, `$` or `$.` select the document itself.
pub fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| {
        let (name, index) = match segment.find('[') {
            Some(open) => (&segment[..open], Some(segment[open + 1..].trim_end_matches(']'))),
            None => (segment, None),
        };
        let current = if name.is_empty() {
            current
        } else {
            current.get(name)?
        };
        match index {
            None => Some(current),
            Some(index) => array_item(current, index),
        }
    })
}

fn array_item<'a>(value: &'a Value, index: &str) -> Option<&'a Value> {
    let items = value.as_array()?;
    let index: i64 = index.parse().ok()?;
    let position = if index < 0 {
        items.len().checked_sub(usize::try_from(index.unsigned_abs()).ok()?)?
    } else {
        usize::try_from(index).ok()?
    };
    items.get(position)
}

/// The value at a path rendered as a string (strings, numbers, booleans)
pub fn select_string(value: &Value, path: &str) -> Option<String> {
    match select(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Every value matched by a path
///
/// Arrays are flattened one level: a path ending on an array yields its items.
/// A missing path yields nothing.
pub fn select_all(value: &Value, path: &str) -> Result<Vec<Value>> {
    if path.contains('*') {
        return select_with_jsonpath(value, path);
    }
    Ok(match select(value, path) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    })
}

fn select_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let path = if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{path}")
    };
    let json_path = JsonPath::try_from(path.as_str())
        .map_err(|e| Error::json_path(format!("Invalid JSONPath '{path}': {e}")))?;

    Ok(match json_path.find(value) {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}
