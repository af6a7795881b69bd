//! Stream slicing module
//!
//! Supports: single slice, static list, datetime windows, test-read limit
//!
//! # Overview
//!
//! A slicer splits a stream into slices, the units of work the retrievers and
//! the job orchestrator operate on. A slice carries partition values (which
//! sub-resource) and a cursor window (which time range).

mod slicers;
mod types;

pub use slicers::{
    DatetimeSlicer, ListSlicer, SinglePartitionSlicer, TestReadSlicer,
    DEFAULT_MAXIMUM_NUMBER_OF_SLICES,
};
pub use types::{SlicerConfig, StreamSlicer};
