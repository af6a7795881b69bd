// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Bulk
//!
//! Bulk exports through remote asynchronous jobs.
//!
//! Many APIs hand out large datasets as jobs: the client asks for an export,
//! polls until the job is done and downloads the result. This crate runs such
//! exports for a stream split into slices, keeping the number of jobs alive
//! on the API side under a budget, retrying failed or timed-out jobs and
//! streaming the records of every completed slice.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::TryStreamExt;
//! use solidafy_bulk::{load_definition, LogMessageRepository, ReadOptions, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let definition = load_definition("streams/orders.yaml")?;
//!     let config = serde_json::json!({ "api_key": "..." });
//!
//!     let retriever = definition.build(&config, Arc::new(LogMessageRepository), &ReadOptions::default())?;
//!     let mut records = retriever.read_records()?;
//!     while let Some(record) = records.try_next().await? {
//!         println!("{record}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  AsyncRetriever: slices → orchestrator → records per partition  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────┬────────────────┴──┬──────────────┬────────────────┐
//! │   Slicer    │   Orchestrator    │  Repository  │  Download      │
//! ├─────────────┼───────────────────┼──────────────┼────────────────┤
//! │ Single      │ Job tracker       │ Create       │ SimpleRetriever│
//! │ List        │ Lookahead         │ Poll         │ Pagination     │
//! │ Datetime    │ Retry / timeout   │ Abort        │ JSON/JSONL/CSV │
//! │ Test read   │ Partitions        │ Delete       │ Cursor         │
//! └─────────────┴───────────────────┴──────────────┴────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Add docs before 1.0 release

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the crate
pub mod error;

/// Common types and type aliases
pub mod types;

/// Out-of-band messages
pub mod message;

/// Template interpolation
pub mod template;

/// HTTP client with retry and rate limiting
pub mod http;

/// Record extraction from response bodies
pub mod extract;

/// Pagination strategies
pub mod pagination;

/// Stream slicing
pub mod slicer;

/// Requesters and retrievers
pub mod retriever;

/// Async job orchestration
pub mod job;

/// Stream definitions
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorKind, FailureType, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{load_definition, load_definition_from_str, AsyncStreamDefinition, ReadOptions};
pub use job::{AsyncJobOrchestrator, AsyncJobRepository, AsyncJobStatus, JobTracker};
pub use message::{InMemoryMessageRepository, LogMessageRepository, Message, MessageRepository};
pub use retriever::{AsyncRetriever, SimpleRetriever};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
