//! Incremental cursors fed by retrieved records

use crate::extract::path::select;
use crate::types::{JsonObject, JsonValue, StreamSlice};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Observes records of a slice and commits a state once the slice is read
pub trait Cursor: Send + Sync {
    fn observe(&self, stream_slice: &StreamSlice, record: &JsonValue);

    /// Called after the last page of a slice
    fn close_slice(&self, stream_slice: &StreamSlice);

    /// Committed state
    fn state(&self) -> JsonValue;
}

#[derive(Debug, Default)]
struct FieldCursorState {
    /// Greatest value seen per slice still being read
    pending: HashMap<String, JsonValue>,
    committed: Option<JsonValue>,
}

/// Keeps the greatest value of a (dotted) record field
///
/// Numbers compare numerically and strings lexicographically, which orders
/// ISO-8601 timestamps correctly. Values of other types are ignored.
#[derive(Debug)]
pub struct FieldCursor {
    cursor_field: String,
    state: Mutex<FieldCursorState>,
}

impl FieldCursor {
    pub fn new(cursor_field: impl Into<String>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            state: Mutex::new(FieldCursorState::default()),
        }
    }

    /// Start from a previously committed state (`{"<field>": value}`)
    #[must_use]
    pub fn with_state(self, state: &JsonValue) -> Self {
        if let Some(value) = state.get(&self.cursor_field) {
            self.lock().committed = Some(value.clone());
        }
        self
    }

    pub fn cursor_field(&self) -> &str {
        &self.cursor_field
    }

    fn lock(&self) -> MutexGuard<'_, FieldCursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cursor for FieldCursor {
    fn observe(&self, stream_slice: &StreamSlice, record: &JsonValue) {
        let Some(value) = select(record, &self.cursor_field) else {
            return;
        };
        if !(value.is_string() || value.is_number()) {
            return;
        }

        let mut state = self.lock();
        let entry = state
            .pending
            .entry(stream_slice.to_string())
            .or_insert_with(|| value.clone());
        if compare(value, entry) == Ordering::Greater {
            *entry = value.clone();
        }
    }

    fn close_slice(&self, stream_slice: &StreamSlice) {
        let mut state = self.lock();
        let Some(value) = state.pending.remove(&stream_slice.to_string()) else {
            return;
        };
        let newer = state
            .committed
            .as_ref()
            .map_or(true, |committed| compare(&value, committed) == Ordering::Greater);
        if newer {
            state.committed = Some(value);
        }
    }

    fn state(&self) -> JsonValue {
        match &self.lock().committed {
            Some(value) => {
                JsonValue::Object(JsonObject::from_iter([(self.cursor_field.clone(), value.clone())]))
            }
            None => JsonValue::Object(JsonObject::new()),
        }
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_commits_greatest_value_on_close() {
        let cursor = FieldCursor::new("meta.updated_at");
        let slice = StreamSlice::new().with_partition("account", "a");

        for ts in ["2024-01-02", "2024-01-05", "2024-01-03"] {
            cursor.observe(&slice, &json!({"meta": {"updated_at": ts}}));
        }
        assert_eq!(cursor.state(), json!({}));

        cursor.close_slice(&slice);
        assert_eq!(cursor.state(), json!({"meta.updated_at": "2024-01-05"}));
    }

    #[test]
    fn test_keeps_committed_value_when_slice_is_older() {
        let cursor = FieldCursor::new("id").with_state(&json!({"id": 10}));
        let slice = StreamSlice::new();

        cursor.observe(&slice, &json!({"id": 7}));
        cursor.observe(&slice, &json!({"name": "no cursor"}));
        cursor.close_slice(&slice);
        assert_eq!(cursor.state(), json!({"id": 10}));

        cursor.observe(&slice, &json!({"id": 12}));
        cursor.close_slice(&slice);
        assert_eq!(cursor.state(), json!({"id": 12}));
    }

    #[test]
    fn test_slices_are_tracked_separately() {
        let cursor = FieldCursor::new("ts");
        let a = StreamSlice::new().with_partition("p", "a");
        let b = StreamSlice::new().with_partition("p", "b");

        cursor.observe(&a, &json!({"ts": "2024-03-01"}));
        cursor.observe(&b, &json!({"ts": "2024-01-01"}));
        cursor.close_slice(&b);
        assert_eq!(cursor.state(), json!({"ts": "2024-01-01"}));

        cursor.close_slice(&a);
        assert_eq!(cursor.state(), json!({"ts": "2024-03-01"}));
    }
}
