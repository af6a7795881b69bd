//! Jobs backing a single slice, with retry bookkeeping

use super::async_job::AsyncJob;
use super::status::AsyncJobStatus;
use crate::error::{Error, Result};
use crate::types::StreamSlice;

/// Attempts allowed per job when nothing else is configured
pub const DEFAULT_JOB_MAX_RETRY: u32 = 3;

#[derive(Debug, Clone)]
struct TrackedJob {
    job: AsyncJob,
    attempts: u32,
}

/// The job(s) created for one slice
///
/// Attempts are kept per job id. Today a partition always holds one job; the
/// list shape leaves room for splitting a slice over several jobs.
#[derive(Debug, Clone)]
pub struct AsyncPartition {
    jobs: Vec<TrackedJob>,
    stream_slice: StreamSlice,
    job_max_retry: u32,
}

impl AsyncPartition {
    pub fn new(jobs: Vec<AsyncJob>, stream_slice: StreamSlice, job_max_retry: Option<u32>) -> Self {
        Self {
            jobs: jobs
                .into_iter()
                .map(|job| TrackedJob { job, attempts: 1 })
                .collect(),
            stream_slice,
            job_max_retry: job_max_retry.unwrap_or(DEFAULT_JOB_MAX_RETRY).max(1),
        }
    }

    /// Aggregate status: Failed > TimedOut > Running > Completed
    pub fn status(&self) -> AsyncJobStatus {
        let statuses: Vec<AsyncJobStatus> = self.jobs.iter().map(|t| t.job.status()).collect();
        if statuses.contains(&AsyncJobStatus::Failed) {
            AsyncJobStatus::Failed
        } else if statuses.contains(&AsyncJobStatus::TimedOut) {
            AsyncJobStatus::TimedOut
        } else if statuses.iter().any(|s| *s != AsyncJobStatus::Completed) {
            AsyncJobStatus::Running
        } else {
            AsyncJobStatus::Completed
        }
    }

    /// Whether any job already used all its attempts
    pub fn has_reached_max_attempt(&self) -> bool {
        self.jobs.iter().any(|t| t.attempts >= self.job_max_retry)
    }

    /// Swap a job for its replacement(s), counting one more attempt
    pub fn replace_job(&mut self, job_id: &str, new_jobs: Vec<AsyncJob>) -> Result<()> {
        let position = self
            .jobs
            .iter()
            .position(|t| t.job.api_job_id() == job_id)
            .ok_or_else(|| Error::partition(format!("Can't find job {job_id} in partition")))?;

        let attempts = self.jobs[position].attempts;
        if attempts >= self.job_max_retry {
            return Err(Error::partition(format!(
                "Job {job_id} already used {attempts} of {} allowed attempts",
                self.job_max_retry
            )));
        }

        self.jobs.remove(position);
        self.jobs.extend(new_jobs.into_iter().map(|job| TrackedJob {
            job,
            attempts: attempts + 1,
        }));
        Ok(())
    }

    pub fn jobs(&self) -> impl Iterator<Item = &AsyncJob> {
        self.jobs.iter().map(|t| &t.job)
    }

    pub fn jobs_mut(&mut self) -> impl Iterator<Item = &mut AsyncJob> {
        self.jobs.iter_mut().map(|t| &mut t.job)
    }

    /// Attempts used by a job, if tracked
    pub fn attempts(&self, job_id: &str) -> Option<u32> {
        self.jobs
            .iter()
            .find(|t| t.job.api_job_id() == job_id)
            .map(|t| t.attempts)
    }

    pub fn stream_slice(&self) -> &StreamSlice {
        &self.stream_slice
    }

    pub fn into_jobs(self) -> Vec<AsyncJob> {
        self.jobs.into_iter().map(|t| t.job).collect()
    }
}
