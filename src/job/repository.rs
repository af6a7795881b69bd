//! Contract between the orchestrator and a remote bulk API

use super::async_job::AsyncJob;
use crate::error::Result;
use crate::types::{JsonValue, StreamSlice};
use async_trait::async_trait;

/// Creates, polls, downloads and cleans up remote jobs
///
/// Implementations talk to one API. The orchestrator owns the jobs and only
/// lends them to the repository.
#[async_trait]
pub trait AsyncJobRepository: Send + Sync {
    /// Create a remote job for a slice
    ///
    /// The returned job is `Running`.
    async fn start(&self, stream_slice: &StreamSlice) -> Result<AsyncJob>;

    /// Refresh the status of each job in place
    async fn update_jobs_status(&self, jobs: &mut [&mut AsyncJob]) -> Result<()>;

    /// Records produced by a completed job
    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonValue>>;

    /// Ask the API to stop a job
    async fn abort(&self, job: &AsyncJob) -> Result<()>;

    /// Free whatever the API keeps for a job (files, results)
    async fn delete(&self, job: &AsyncJob) -> Result<()>;
}
