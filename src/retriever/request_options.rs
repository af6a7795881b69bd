//! Request options assembled from paginators, slices and requesters

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, StreamSlice};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Parameters, headers and body added to a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<JsonValue>,
    /// Absolute URL replacing the requester's path (next-page links)
    pub url: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Combine several option sets
    ///
    /// A parameter or header set by two sources is an error. JSON bodies are
    /// deep-merged and never conflict; the later source wins. The last URL
    /// override wins.
    pub fn combine<'a>(sources: impl IntoIterator<Item = &'a RequestOptions>) -> Result<Self> {
        let sources: Vec<&RequestOptions> = sources.into_iter().collect();
        Ok(Self {
            params: combine_mappings(OptionType::RequestParameter, sources.iter().map(|s| &s.params))?,
            headers: combine_mappings(OptionType::Header, sources.iter().map(|s| &s.headers))?,
            body: sources
                .iter()
                .filter_map(|s| s.body.clone())
                .reduce(merge_json_bodies),
            url: sources.iter().rev().find_map(|s| s.url.clone()),
        })
    }
}

/// Part of a request an option lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    RequestParameter,
    Header,
    BodyJson,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequestParameter => "request_parameter",
            Self::Header => "header",
            Self::BodyJson => "body_json",
        })
    }
}

/// Union of string mappings, rejecting keys set more than once
pub fn combine_mappings<'a>(
    option: OptionType,
    mappings: impl IntoIterator<Item = &'a BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    let mut combined = BTreeMap::new();
    for mapping in mappings {
        for (key, value) in mapping {
            if combined.insert(key.clone(), value.clone()).is_some() {
                return Err(Error::RequestOptionCollision {
                    option: option.to_string(),
                    key: key.clone(),
                });
            }
        }
    }
    Ok(combined)
}

/// Deep merge of two JSON bodies; `overlay` wins on conflicting leaves
pub fn merge_json_bodies(base: JsonValue, overlay: JsonValue) -> JsonValue {
    match (base, overlay) {
        (JsonValue::Object(mut base), JsonValue::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => {
                        if !(existing.is_object() && value.is_object()) && existing != value {
                            debug!("Body field '{key}' set by several sources, keeping the last one");
                        }
                        merge_json_bodies(existing, value)
                    }
                    None => value,
                };
                base.insert(key, merged);
            }
            JsonValue::Object(base)
        }
        (_, overlay) => overlay,
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Slice-derived request options
pub trait RequestOptionsProvider: Send + Sync {
    fn request_options(&self, stream_slice: &StreamSlice) -> Result<RequestOptions>;
}

/// Provides nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRequestOptions;

impl RequestOptionsProvider for NoRequestOptions {
    fn request_options(&self, _stream_slice: &StreamSlice) -> Result<RequestOptions> {
        Ok(RequestOptions::default())
    }
}

/// Copies one slice value into the request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestOptionInjection {
    /// Key looked up in the slice (partition, then cursor, then extra fields)
    pub slice_field: String,
    pub inject_into: OptionType,
    /// Name of the parameter, header or body field
    pub field_name: String,
}

/// Injects slice values as parameters, headers or body fields
#[derive(Debug, Clone, Default)]
pub struct SliceRequestOptionsProvider {
    injections: Vec<RequestOptionInjection>,
}

impl SliceRequestOptionsProvider {
    pub fn new(injections: Vec<RequestOptionInjection>) -> Self {
        Self { injections }
    }
}

impl RequestOptionsProvider for SliceRequestOptionsProvider {
    fn request_options(&self, stream_slice: &StreamSlice) -> Result<RequestOptions> {
        let mut options = RequestOptions::default();
        let mut body = JsonObject::new();

        for injection in &self.injections {
            let Some(value) = stream_slice.get(&injection.slice_field) else {
                continue;
            };
            match injection.inject_into {
                OptionType::RequestParameter => {
                    options
                        .params
                        .insert(injection.field_name.clone(), value_as_string(value));
                }
                OptionType::Header => {
                    options
                        .headers
                        .insert(injection.field_name.clone(), value_as_string(value));
                }
                OptionType::BodyJson => {
                    body.insert(injection.field_name.clone(), value.clone());
                }
            }
        }

        if !body.is_empty() {
            options.body = Some(JsonValue::Object(body));
        }
        Ok(options)
    }
}

fn value_as_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
