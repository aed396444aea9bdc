//! Dot-notation field path resolution.
//!
//! Shared by the query and projection engines. Paths traverse nested
//! objects only; arrays are opaque values at path level (element matching
//! belongs to `$elemMatch`).

use serde_json::{Map, Value};

/// Resolve a dot-separated path against a document.
///
/// Returns `None` ("absent") when a segment is missing or the traversal
/// passes through a non-object before the path is exhausted. Absent is
/// distinct from present-null: `Some(Value::Null)` means the field exists
/// and is null.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Insert a value at a dot-separated path, creating intermediate objects.
///
/// Used by inclusion projections to rebuild nested structure.
pub fn insert_at(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            // A primitive already sits where a sub-object is needed; the
            // deeper path cannot exist, so there is nothing to insert.
            _ => return,
        }
    }
}

/// Remove the value at a dot-separated path, if present.
///
/// Used by exclusion projections. Intermediate objects are left in place
/// even when they become empty.
pub fn remove_at(target: &mut Map<String, Value>, path: &str) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.remove(segment);
            return;
        }
        match current.get_mut(segment) {
            Some(Value::Object(map)) => current = map,
            _ => return,
        }
    }
}
