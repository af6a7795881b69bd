//! A single remote asynchronous job

use super::status::AsyncJobStatus;
use crate::types::StreamSlice;
use std::time::Duration;
use tokio::time::Instant;

/// Timeout applied when the repository does not provide one
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Deadline tracking for a running job
#[derive(Debug, Clone)]
struct JobTimer {
    timeout: Duration,
    started_at: Option<Instant>,
}

impl JobTimer {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            started_at: None,
        }
    }

    fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    fn stop(&mut self) {
        self.started_at = None;
    }

    fn has_timed_out(&self) -> bool {
        self.started_at
            .is_some_and(|started| started.elapsed() > self.timeout)
    }
}

/// One unit of work executed asynchronously by a remote API
///
/// A job value only exists once the remote side accepted it: it starts in
/// [`AsyncJobStatus::Running`] with its timer started. Jobs that could not be
/// created are represented by [`AsyncJob::failed`].
#[derive(Debug, Clone)]
pub struct AsyncJob {
    api_job_id: String,
    job_parameters: StreamSlice,
    status: AsyncJobStatus,
    timer: JobTimer,
}

impl AsyncJob {
    /// Create a running job
    pub fn new(
        api_job_id: impl Into<String>,
        job_parameters: StreamSlice,
        timeout: Option<Duration>,
    ) -> Self {
        let mut timer = JobTimer::new(timeout.unwrap_or(DEFAULT_JOB_TIMEOUT));
        timer.start();
        Self {
            api_job_id: api_job_id.into(),
            job_parameters,
            status: AsyncJobStatus::Running,
            timer,
        }
    }

    /// Create a placeholder for a job whose creation call failed
    ///
    /// The placeholder holds a budget slot until it is replaced, so creation
    /// failures are throttled like any other failed job.
    pub fn failed(job_parameters: StreamSlice) -> Self {
        Self {
            api_job_id: format!("{} - Job that could not start", uuid::Uuid::new_v4()),
            job_parameters,
            status: AsyncJobStatus::Failed,
            timer: JobTimer::new(DEFAULT_JOB_TIMEOUT),
        }
    }

    /// Identifier assigned by the API
    pub fn api_job_id(&self) -> &str {
        &self.api_job_id
    }

    /// Slice the job was created for
    pub fn job_parameters(&self) -> &StreamSlice {
        &self.job_parameters
    }

    /// Current status; `TimedOut` as soon as the timeout elapsed
    pub fn status(&self) -> AsyncJobStatus {
        if self.timer.has_timed_out() {
            return AsyncJobStatus::TimedOut;
        }
        self.status
    }

    /// Apply a status reported by the API
    pub fn update_status(&mut self, status: AsyncJobStatus) {
        if self.status != AsyncJobStatus::Running && status == AsyncJobStatus::Running {
            self.timer.start();
        } else if status.is_terminal() {
            self.timer.stop();
        }
        self.status = status;
    }
}

impl PartialEq for AsyncJob {
    fn eq(&self, other: &Self) -> bool {
        self.api_job_id == other.api_job_id
    }
}

impl Eq for AsyncJob {}
