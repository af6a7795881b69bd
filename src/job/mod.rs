//! Async job module
//!
//! Drives remote bulk jobs: a job is created per slice, polled until it
//! finishes, retried when it fails and downloaded once completed.
//!
//! # Overview
//!
//! - [`JobTracker`] bounds how many jobs exist at once on the remote side
//! - [`AsyncPartition`] groups the job(s) of one slice and counts attempts
//! - [`AsyncJobOrchestrator`] runs the create / poll / classify loop and
//!   streams completed partitions
//! - [`AsyncJobRepository`] is the contract with the remote API;
//!   [`AsyncHttpJobRepository`] implements it over HTTP

mod async_job;
mod http_repository;
mod lookahead;
mod orchestrator;
mod partition;
mod repository;
mod status;
mod tracker;

pub use async_job::{AsyncJob, DEFAULT_JOB_TIMEOUT};
pub use http_repository::{AsyncHttpJobRepository, AsyncHttpJobRepositoryBuilder, StatusMapping};
pub use lookahead::LookaheadIterator;
pub use orchestrator::{AsyncJobOrchestrator, DEFAULT_POLLING_INTERVAL};
pub use partition::{AsyncPartition, DEFAULT_JOB_MAX_RETRY};
pub use repository::AsyncJobRepository;
pub use status::AsyncJobStatus;
pub use tracker::{JobTracker, ReservationId};

#[cfg(test)]
mod tests;
