//! Slicer types and traits

use super::slicers::{DatetimeSlicer, ListSlicer, SinglePartitionSlicer};
use crate::error::Result;
use crate::template::{render, TemplateContext};
use crate::types::{JsonValue, SliceIter};
use serde::Deserialize;

/// Produces the slices of a stream
///
/// The iterator may be lazy and even infinite; consumers only pull what they
/// need.
pub trait StreamSlicer: Send + Sync {
    fn stream_slices(&self) -> Result<SliceIter>;
}

/// Slicer configuration as written in a stream definition
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlicerConfig {
    /// One empty slice
    #[default]
    Single,

    /// One slice per listed value
    List {
        values: Vec<JsonValue>,
        /// Partition key the value is exposed under
        partition_field: String,
    },

    /// Consecutive datetime windows
    Datetime {
        /// Start datetime (value or template, e.g. `{{ config.start_date }}`)
        start: String,
        /// End datetime (value, template or `now`)
        #[serde(default = "default_end")]
        end: String,
        /// Window size (e.g. "1d", "12h", "30m")
        step: String,
        #[serde(default = "default_format")]
        format: String,
        #[serde(default = "default_start_param")]
        start_param: String,
        #[serde(default = "default_end_param")]
        end_param: String,
    },
}

fn default_end() -> String {
    "now".to_string()
}

fn default_format() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

fn default_start_param() -> String {
    "start_time".to_string()
}

fn default_end_param() -> String {
    "end_time".to_string()
}

impl SlicerConfig {
    /// Build the slicer, rendering templates against the connector config
    pub fn build(&self, config: &JsonValue) -> Result<Box<dyn StreamSlicer>> {
        Ok(match self {
            Self::Single => Box::new(SinglePartitionSlicer),
            Self::List {
                values,
                partition_field,
            } => Box::new(ListSlicer::new(values.clone(), partition_field.as_str())),
            Self::Datetime {
                start,
                end,
                step,
                format,
                start_param,
                end_param,
            } => {
                let ctx = TemplateContext::new(config);
                Box::new(DatetimeSlicer::from_strings(
                    &render(start, &ctx)?,
                    &render(end, &ctx)?,
                    step,
                    format.as_str(),
                    start_param.as_str(),
                    end_param.as_str(),
                )?)
            }
        })
    }
}
