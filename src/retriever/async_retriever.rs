//! Records of a stream read through remote bulk jobs

use crate::error::{ErrorKind, Result};
use crate::job::{AsyncJobOrchestrator, AsyncJobRepository, JobTracker, DEFAULT_POLLING_INTERVAL};
use crate::message::MessageRepository;
use crate::slicer::{StreamSlicer, TestReadSlicer};
use crate::types::RecordStream;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Runs one orchestration over the slices of a slicer
///
/// Each completed partition is turned into its records right away: every job
/// is downloaded, then deleted on the API side.
pub struct AsyncRetriever {
    repository: Arc<dyn AsyncJobRepository>,
    slicer: Box<dyn StreamSlicer>,
    job_tracker: Arc<JobTracker>,
    message_repository: Arc<dyn MessageRepository>,
    job_max_retry: Option<u32>,
    has_bulk_parent: bool,
    exceptions_to_break_on: HashSet<ErrorKind>,
    polling_interval: Duration,
}

impl AsyncRetriever {
    pub fn new(
        repository: Arc<dyn AsyncJobRepository>,
        slicer: Box<dyn StreamSlicer>,
        job_tracker: Arc<JobTracker>,
        message_repository: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            repository,
            slicer,
            job_tracker,
            message_repository,
            job_max_retry: None,
            has_bulk_parent: false,
            exceptions_to_break_on: HashSet::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_job_max_retry(mut self, job_max_retry: u32) -> Self {
        self.job_max_retry = Some(job_max_retry);
        self
    }

    #[must_use]
    pub fn with_bulk_parent(mut self, has_bulk_parent: bool) -> Self {
        self.has_bulk_parent = has_bulk_parent;
        self
    }

    #[must_use]
    pub fn with_exceptions_to_break_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.exceptions_to_break_on = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    /// Test read: a single attempt per job and at most `max_slices` slices
    #[must_use]
    pub fn with_test_read(mut self, max_slices: Option<usize>) -> Self {
        self.slicer = Box::new(TestReadSlicer::new(self.slicer, max_slices));
        self.job_max_retry = Some(1);
        self
    }

    /// Records of every completed partition, in completion order
    ///
    /// Errors of the orchestration (breaking errors, the final incomplete-run
    /// error) are items of the stream.
    pub fn read_records(&self) -> Result<RecordStream<'static>> {
        let slices = self.slicer.stream_slices()?;

        let mut orchestrator = AsyncJobOrchestrator::new(
            Arc::clone(&self.repository),
            slices,
            Arc::clone(&self.job_tracker),
            Arc::clone(&self.message_repository),
        )
        .with_bulk_parent(self.has_bulk_parent)
        .with_exceptions_to_break_on(self.exceptions_to_break_on.iter().copied())
        .with_polling_interval(self.polling_interval);
        if let Some(job_max_retry) = self.job_max_retry {
            orchestrator = orchestrator.with_job_max_retry(job_max_retry);
        }

        let repository = Arc::clone(&self.repository);
        Ok(orchestrator
            .create_and_get_completed_partitions()
            .map_ok(move |partition| {
                AsyncJobOrchestrator::fetch_records(Arc::clone(&repository), partition)
            })
            .try_flatten()
            .boxed())
    }
}

impl std::fmt::Debug for AsyncRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRetriever")
            .field("job_max_retry", &self.job_max_retry)
            .field("has_bulk_parent", &self.has_bulk_parent)
            .field("polling_interval", &self.polling_interval)
            .finish_non_exhaustive()
    }
}
