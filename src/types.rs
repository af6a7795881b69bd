//! Common types used throughout Solidafy Bulk
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Lazily produced records
pub type RecordStream<'a> = BoxStream<'a, Result<JsonValue>>;

/// Lazily produced (possibly infinite) slices
pub type SliceIter = Box<dyn Iterator<Item = StreamSlice> + Send>;

// ============================================================================
// Stream Slice
// ============================================================================

/// An opaque unit of work describing which subset of data to fetch
///
/// - `partition` identifies the sub-resource (account, region, parent id)
/// - `cursor_slice` carries the incremental window (start/end)
/// - `extra_fields` carries values that are not part of the slice identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSlice {
    #[serde(default)]
    pub partition: JsonObject,
    #[serde(default)]
    pub cursor_slice: JsonObject,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub extra_fields: JsonObject,
}

impl StreamSlice {
    /// Create an empty slice
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition value
    #[must_use]
    pub fn with_partition(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.partition.insert(key.into(), value.into());
        self
    }

    /// Add a cursor value
    #[must_use]
    pub fn with_cursor(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.cursor_slice.insert(key.into(), value.into());
        self
    }

    /// Add an extra field
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    /// Look a key up in partition, then cursor slice, then extra fields
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.partition
            .get(key)
            .or_else(|| self.cursor_slice.get(key))
            .or_else(|| self.extra_fields.get(key))
    }

    /// Flatten into a single JSON object (used as template context)
    pub fn to_value(&self) -> JsonValue {
        let mut merged = self.extra_fields.clone();
        merged.extend(self.cursor_slice.clone());
        merged.extend(self.partition.clone());
        JsonValue::Object(merged)
    }
}

impl fmt::Display for StreamSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{partition={}, cursor_slice={}}}",
            JsonValue::Object(self.partition.clone()),
            JsonValue::Object(self.cursor_slice.clone())
        )
    }
}

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::PATCH => reqwest::Method::PATCH,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
