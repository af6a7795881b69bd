//! Template interpolation for stream definitions
//!
//! Handles `{{ variable }}` interpolation in URLs, headers, params and bodies.
//! Roots:
//! - `config` - the connector configuration
//! - `stream_slice` (alias `slice`) - the slice being processed, flattened
//! - any other name - a named variable such as `job_id`, `creation_response`,
//!   `polling_response` or `download_target`
//!
//! A placeholder spanning the whole string keeps the JSON type of the value
//! when rendering JSON bodies, so `"{{ stream_slice.ids }}"` can render an array.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, StreamSlice};
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_]+)*)\s*\}\}")
        .unwrap_or_else(|e| unreachable!("template regex is valid: {e}"))
});

/// Values available to templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    config: JsonValue,
    slice: JsonValue,
    vars: JsonObject,
}

impl TemplateContext {
    pub fn new(config: &JsonValue) -> Self {
        Self {
            config: config.clone(),
            ..Default::default()
        }
    }

    /// Expose a slice under `stream_slice`
    #[must_use]
    pub fn with_slice(mut self, slice: &StreamSlice) -> Self {
        self.slice = slice.to_value();
        self
    }

    /// Expose a named variable
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Get a value by path (e.g. `config.api_key`, `creation_response.id`)
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split('.');
        let root = match parts.next()? {
            "config" => &self.config,
            "stream_slice" | "slice" => &self.slice,
            name => self.vars.get(name)?,
        };
        parts.try_fold(root, |current, part| match current {
            JsonValue::Object(map) => map.get(part),
            JsonValue::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let var_path = &caps[1];
        match ctx.get(var_path) {
            Some(value) => value_to_string(value),
            None => {
                missing.push(var_path.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render every string (and key) of a JSON value
pub fn render_value(value: &JsonValue, ctx: &TemplateContext) -> Result<JsonValue> {
    match value {
        JsonValue::String(s) => {
            if let Some(caps) = TEMPLATE_REGEX.captures(s) {
                if caps[0].len() == s.trim().len() {
                    return ctx
                        .get(&caps[1])
                        .cloned()
                        .ok_or_else(|| Error::undefined_var(&caps[1]));
                }
                return Ok(JsonValue::String(render(s, ctx)?));
            }
            Ok(value.clone())
        }
        JsonValue::Object(map) => {
            let mut rendered = JsonObject::new();
            for (k, v) in map {
                rendered.insert(render(k, ctx)?, render_value(v, ctx)?);
            }
            Ok(JsonValue::Object(rendered))
        }
        JsonValue::Array(items) => items
            .iter()
            .map(|v| render_value(v, ctx))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        _ => Ok(value.clone()),
    }
}
