//! Record extraction module
//!
//! Supports: JSON (with field path), JSON Lines, CSV
//!
//! # Overview
//!
//! Extractors turn a response body into records. The [`path`] helpers are
//! also used by paginators and the job repository to read single values
//! (cursor tokens, job ids, statuses, download targets) out of responses.

mod extractors;
pub mod path;

pub use extractors::{
    CsvExtractor, DpathExtractor, ExtractorConfig, JsonlExtractor, RecordExtractor,
};
