//! Control loop driving remote jobs from slices to completed partitions
//!
//! Each round:
//! 1. replaces failed or timed-out jobs, then starts jobs for new slices
//!    while the job budget allows it
//! 2. stops once every slice was consumed and no partition is running
//! 3. refreshes the status of running jobs
//! 4. classifies partitions: completed ones are queued for the caller, failed
//!    ones are retried or given up on
//! 5. waits for the polling interval
//!
//! Errors raised by a round either stop everything (breaking errors) or are
//! collected and reported once all slices were processed.

use super::async_job::AsyncJob;
use super::lookahead::LookaheadIterator;
use super::partition::AsyncPartition;
use super::repository::AsyncJobRepository;
use super::status::AsyncJobStatus;
use super::tracker::{JobTracker, ReservationId};
use crate::error::{Error, ErrorKind, FailureType, Result};
use crate::message::{Message, MessageRepository};
use crate::types::{RecordStream, SliceIter, StreamSlice};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{HashSet, VecDeque};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wait between two rounds when nothing else is configured
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

enum Round {
    Continue,
    Exhausted,
}

/// Turns slices into completed partitions through a remote job API
pub struct AsyncJobOrchestrator {
    job_repository: Arc<dyn AsyncJobRepository>,
    slices: LookaheadIterator<SliceIter>,
    job_tracker: Arc<JobTracker>,
    message_repository: Arc<dyn MessageRepository>,
    job_max_retry: Option<u32>,
    has_bulk_parent: bool,
    exceptions_to_break_on: HashSet<ErrorKind>,
    polling_interval: Duration,

    running_partitions: Vec<AsyncPartition>,
    awaiting_replacement: HashSet<String>,
    ready: VecDeque<AsyncPartition>,
    non_breaking_errors: Vec<Error>,
    final_error: Option<Error>,
    wait_before_next_round: bool,
    finished: bool,
}

impl AsyncJobOrchestrator {
    pub fn new(
        job_repository: Arc<dyn AsyncJobRepository>,
        slices: SliceIter,
        job_tracker: Arc<JobTracker>,
        message_repository: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            job_repository,
            slices: LookaheadIterator::new(slices),
            job_tracker,
            message_repository,
            job_max_retry: None,
            has_bulk_parent: false,
            exceptions_to_break_on: HashSet::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            running_partitions: Vec::new(),
            awaiting_replacement: HashSet::new(),
            ready: VecDeque::new(),
            non_breaking_errors: Vec::new(),
            final_error: None,
            wait_before_next_round: false,
            finished: false,
        }
    }

    /// Attempts allowed per job (default 3)
    #[must_use]
    pub fn with_job_max_retry(mut self, job_max_retry: u32) -> Self {
        self.job_max_retry = Some(job_max_retry);
        self
    }

    /// Start at most one new slice per round while the parent has more
    ///
    /// Used when the slices themselves come from another bulk stream, so the
    /// child does not take the whole job budget.
    #[must_use]
    pub fn with_bulk_parent(mut self, has_bulk_parent: bool) -> Self {
        self.has_bulk_parent = has_bulk_parent;
        self
    }

    /// Error kinds that stop the run instead of being collected
    #[must_use]
    pub fn with_exceptions_to_break_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.exceptions_to_break_on.extend(kinds);
        self
    }

    /// Wait between two status refreshes
    #[must_use]
    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    /// Completed partitions as a stream
    ///
    /// Collected errors come last, as a single [`Error::IncompleteRun`].
    pub fn create_and_get_completed_partitions(self) -> BoxStream<'static, Result<AsyncPartition>> {
        stream::unfold(self, |mut orchestrator| async move {
            orchestrator
                .next_completed_partition()
                .await
                .map(|item| (item, orchestrator))
        })
        .boxed()
    }

    /// Run rounds until a partition completes, the run fails or ends
    ///
    /// Returns `None` forever once finished.
    ///
    /// # Cancel safety
    ///
    /// Running partitions stay in the orchestrator at every await point, and a
    /// slice is only consumed once its job was created. Dropping this future
    /// (for example in `tokio::select!`) and calling it again resumes the run.
    /// A creation request dropped in flight may still have started a job on
    /// the API side; that job is never polled or aborted. An abort call
    /// dropped in flight keeps the budget slot of its job.
    pub async fn next_completed_partition(&mut self) -> Option<Result<AsyncPartition>> {
        loop {
            if let Some(partition) = self.ready.pop_front() {
                return Some(Ok(partition));
            }
            if self.finished {
                return self.final_error.take().map(Err);
            }
            if self.wait_before_next_round {
                tokio::time::sleep(self.polling_interval).await;
                self.wait_before_next_round = false;
            }

            match self.run_round().await {
                Ok(Round::Continue) => self.wait_before_next_round = true,
                Ok(Round::Exhausted) => {
                    self.finished = true;
                    if !self.non_breaking_errors.is_empty() {
                        let errors = mem::take(&mut self.non_breaking_errors)
                            .iter()
                            .map(ToString::to_string)
                            .collect();
                        self.final_error = Some(Error::IncompleteRun { errors });
                    }
                }
                Err(error) if self.is_breaking(&error) => {
                    warn!("Caught exception that stops the processing of the jobs: {error}");
                    self.finished = true;
                    self.final_error = Some(error);
                    self.abort_all_running_jobs().await;
                }
                Err(error) => {
                    warn!("Caught exception while processing the jobs, will carry on: {error}");
                    self.non_breaking_errors.push(error);
                }
            }
        }
    }

    /// Records of every job of a partition
    ///
    /// Each job is deleted on the API side once its records were fetched.
    pub fn fetch_records(
        repository: Arc<dyn AsyncJobRepository>,
        partition: AsyncPartition,
    ) -> RecordStream<'static> {
        stream::iter(partition.into_jobs())
            .then(move |job| {
                let repository = Arc::clone(&repository);
                async move {
                    let records = repository.fetch_records(&job).await?;
                    repository.delete(&job).await?;
                    Ok::<_, Error>(stream::iter(records.into_iter().map(Ok::<_, Error>)))
                }
            })
            .try_flatten()
            .boxed()
    }

    async fn run_round(&mut self) -> Result<Round> {
        debug!(
            running_partitions = self.running_partitions.len(),
            outstanding_jobs = self.job_tracker.outstanding(),
            "Starting orchestration round"
        );

        self.start_jobs().await?;
        if !self.slices.has_next() && self.running_partitions.is_empty() {
            return Ok(Round::Exhausted);
        }

        self.update_jobs_status().await?;
        self.process_running_partitions().await;
        Ok(Round::Continue)
    }

    fn is_breaking(&self, error: &Error) -> bool {
        self.exceptions_to_break_on.contains(&error.kind())
            || error.failure_type() == FailureType::ConfigError
    }

    // ------------------------------------------------------------------------
    // Start phase
    // ------------------------------------------------------------------------

    async fn start_jobs(&mut self) -> Result<()> {
        match self.replace_failed_jobs().await {
            Err(Error::ConcurrentJobLimitReached { .. }) => {
                debug!("Job budget exhausted while replacing failed jobs. Will try again later...");
                return Ok(());
            }
            other => other?,
        }

        if self.has_bulk_parent && !self.running_partitions.is_empty() && self.slices.has_next() {
            debug!(
                "Operating as a child of a bulk stream: waiting for running partitions before \
                 starting the next slice so the job budget is left to the parent"
            );
            return Ok(());
        }

        while let Some(slice) = self.slices.peek().cloned() {
            let job = match self.start_job(&slice, None).await {
                Ok(job) => job,
                Err(Error::ConcurrentJobLimitReached { .. }) => {
                    debug!(
                        "Waiting before creating more jobs as the limit of concurrent jobs has \
                         been reached. Will try again later..."
                    );
                    return Ok(());
                }
                Err(error) => {
                    self.slices.next();
                    return Err(error);
                }
            };
            self.slices.next();
            self.running_partitions
                .push(AsyncPartition::new(vec![job], slice, self.job_max_retry));

            if self.has_bulk_parent && self.slices.has_next() {
                break;
            }
        }
        Ok(())
    }

    async fn replace_failed_jobs(&mut self) -> Result<()> {
        for index in 0..self.running_partitions.len() {
            let to_replace: Vec<(String, StreamSlice)> = self.running_partitions[index]
                .jobs()
                .filter(|job| self.awaiting_replacement.contains(job.api_job_id()))
                .map(|job| (job.api_job_id().to_string(), job.job_parameters().clone()))
                .collect();

            for (job_id, slice) in to_replace {
                let new_job = self.start_job(&slice, Some(&job_id)).await?;
                self.awaiting_replacement.remove(&job_id);
                self.running_partitions[index].replace_job(&job_id, vec![new_job])?;
            }
        }
        Ok(())
    }

    /// Create a job, reusing the budget of `previous_job_id` when replacing
    async fn start_job(&mut self, slice: &StreamSlice, previous_job_id: Option<&str>) -> Result<AsyncJob> {
        let budget = match previous_job_id.and_then(|id| self.job_tracker.reservation_for(id)) {
            Some(reservation) => PendingBudget::inherited(&self.job_tracker, reservation),
            None => PendingBudget::fresh(&self.job_tracker, self.job_tracker.try_to_get_intent()?),
        };

        match self.job_repository.start(slice).await {
            Ok(job) => {
                budget.bind(job.api_job_id())?;
                Ok(job)
            }
            Err(error) => {
                warn!("Exception has occurred during job creation: {error}");
                if self.is_breaking(&error) {
                    budget.release();
                    return Err(error);
                }

                let job = AsyncJob::failed(slice.clone());
                budget.bind(job.api_job_id())?;
                self.message_repository.emit_message(Message::trace(
                    error.failure_type(),
                    format!("Failed to start job for slice: {slice}"),
                    error.internal_message(),
                ));
                Ok(job)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Status refresh and classification
    // ------------------------------------------------------------------------

    async fn update_jobs_status(&mut self) -> Result<()> {
        let mut running: Vec<&mut AsyncJob> = self
            .running_partitions
            .iter_mut()
            .flat_map(AsyncPartition::jobs_mut)
            .filter(|job| job.status() == AsyncJobStatus::Running)
            .collect();

        if running.is_empty() {
            return Ok(());
        }
        self.job_repository.update_jobs_status(&mut running).await
    }

    /// Sort partitions, then make the abort calls once the state is settled
    async fn process_running_partitions(&mut self) {
        let partitions = mem::take(&mut self.running_partitions);
        let mut still_running: VecDeque<AsyncPartition> = VecDeque::with_capacity(partitions.len());
        let mut to_stop = Vec::new();
        let mut timed_out = Vec::new();

        for partition in partitions {
            for job in partition.jobs() {
                if job.status() == AsyncJobStatus::Completed {
                    self.job_tracker.remove_job(job.api_job_id());
                }
            }

            match partition.status() {
                AsyncJobStatus::Completed => {
                    let job_ids: Vec<&str> = partition.jobs().map(AsyncJob::api_job_id).collect();
                    info!(
                        "The following jobs for stream slice {} have been completed: {:?}.",
                        partition.stream_slice(),
                        job_ids
                    );
                    self.ready.push_back(partition);
                }
                AsyncJobStatus::Running => still_running.push_back(partition),
                AsyncJobStatus::Failed | AsyncJobStatus::TimedOut
                    if partition.has_reached_max_attempt() =>
                {
                    self.non_breaking_errors.push(max_attempts_error(&partition));
                    for job in partition.jobs() {
                        if job.status().is_running_on_api_side() {
                            to_stop.push(job.clone());
                        } else {
                            self.job_tracker.remove_job(job.api_job_id());
                        }
                    }
                }
                AsyncJobStatus::Failed | AsyncJobStatus::TimedOut => {
                    for job in partition.jobs() {
                        match job.status() {
                            AsyncJobStatus::TimedOut => timed_out.push(job.clone()),
                            AsyncJobStatus::Failed => {}
                            AsyncJobStatus::Running | AsyncJobStatus::Completed => continue,
                        }
                        self.awaiting_replacement.insert(job.api_job_id().to_string());
                    }
                    // Retried first on the next round
                    still_running.push_front(partition);
                }
            }
        }

        self.running_partitions = still_running.into();

        for job in &to_stop {
            self.abort_job(job, true).await;
        }
        for job in &timed_out {
            self.abort_job(job, false).await;
        }
    }

    // ------------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------------

    async fn stop_partition(&mut self, partition: &AsyncPartition) {
        for job in partition.jobs() {
            if job.status().is_running_on_api_side() {
                self.abort_job(job, true).await;
            } else {
                self.job_tracker.remove_job(job.api_job_id());
            }
        }
    }

    async fn abort_all_running_jobs(&mut self) {
        let partitions = mem::take(&mut self.running_partitions);
        self.awaiting_replacement.clear();
        for partition in &partitions {
            self.stop_partition(partition).await;
        }
    }

    /// Abort a job on the API side; failures are only logged
    ///
    /// With `free_budget` the job's slot is released even when the abort call
    /// failed, since nothing will track the job afterwards.
    async fn abort_job(&mut self, job: &AsyncJob, free_budget: bool) {
        if let Err(error) = self.job_repository.abort(job).await {
            warn!("Could not abort job {}: {error}", job.api_job_id());
        }
        if free_budget {
            self.job_tracker.remove_job(job.api_job_id());
        }
    }
}

impl std::fmt::Debug for AsyncJobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncJobOrchestrator")
            .field("running_partitions", &self.running_partitions.len())
            .field("ready", &self.ready.len())
            .field("non_breaking_errors", &self.non_breaking_errors.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Budget slot held while a job is being created
///
/// A fresh reservation goes back to the tracker if the creation is dropped
/// before the job id is known.
struct PendingBudget<'a> {
    tracker: &'a JobTracker,
    reservation: ReservationId,
    release_on_drop: bool,
}

impl<'a> PendingBudget<'a> {
    fn fresh(tracker: &'a JobTracker, reservation: ReservationId) -> Self {
        Self {
            tracker,
            reservation,
            release_on_drop: true,
        }
    }

    /// Slot of a job being replaced; it stays bound to that job until rebound
    fn inherited(tracker: &'a JobTracker, reservation: ReservationId) -> Self {
        Self {
            tracker,
            reservation,
            release_on_drop: false,
        }
    }

    fn bind(mut self, job_id: &str) -> Result<()> {
        self.release_on_drop = false;
        self.tracker.add_job(self.reservation, job_id)
    }

    fn release(mut self) {
        self.release_on_drop = false;
        self.tracker.release_intent(self.reservation);
    }
}

impl Drop for PendingBudget<'_> {
    fn drop(&mut self) {
        if self.release_on_drop {
            self.tracker.release_intent(self.reservation);
        }
    }
}

fn max_attempts_error(partition: &AsyncPartition) -> Error {
    let statuses: Vec<String> = partition
        .jobs()
        .map(|job| format!("{}: {}", job.api_job_id(), job.status()))
        .collect();
    let message = format!(
        "At least one job could not be completed for slice {}. Job statuses were: {{{}}}. \
         See warning logs for more information.",
        partition.stream_slice(),
        statuses.join(", ")
    );
    Error::traced(message.clone(), message, FailureType::ConfigError)
}
