//! Tests for the job orchestration loop

use super::*;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{InMemoryMessageRepository, Message};
use crate::types::{JsonValue, SliceIter, StreamSlice};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted repository
// ============================================================================

type ErrorFactory = fn() -> Error;

/// Job ids are `<slice id>-<attempt>`. Unscripted jobs complete on first poll.
#[derive(Default)]
struct MockJobRepository {
    statuses: Mutex<HashMap<String, VecDeque<AsyncJobStatus>>>,
    start_errors: Mutex<HashMap<String, ErrorFactory>>,
    start_delays: Mutex<HashMap<String, Duration>>,
    poll_errors: Mutex<VecDeque<Option<ErrorFactory>>>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl MockJobRepository {
    /// Statuses returned by successive polls; the last one repeats
    fn with_statuses(self, job_id: &str, statuses: &[AsyncJobStatus]) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), statuses.iter().copied().collect());
        self
    }

    fn with_start_error(self, job_id: &str, error: ErrorFactory) -> Self {
        self.start_errors
            .lock()
            .unwrap()
            .insert(job_id.to_string(), error);
        self
    }

    fn with_start_delay(self, job_id: &str, delay: Duration) -> Self {
        self.start_delays
            .lock()
            .unwrap()
            .insert(job_id.to_string(), delay);
        self
    }

    /// One entry per status refresh; `Some` makes that refresh fail
    fn with_poll_errors(self, errors: Vec<Option<ErrorFactory>>) -> Self {
        *self.poll_errors.lock().unwrap() = errors.into();
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn slice_id(slice: &StreamSlice) -> String {
    slice
        .get("id")
        .and_then(JsonValue::as_str)
        .unwrap_or("none")
        .to_string()
}

#[async_trait]
impl AsyncJobRepository for MockJobRepository {
    async fn start(&self, stream_slice: &StreamSlice) -> Result<AsyncJob> {
        let key = slice_id(stream_slice);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let job_id = format!("{key}-{attempt}");
        self.record(format!("start:{job_id}"));

        let delay = self.start_delays.lock().unwrap().get(&job_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(make_error) = self.start_errors.lock().unwrap().get(&job_id) {
            return Err(make_error());
        }
        Ok(AsyncJob::new(
            job_id,
            stream_slice.clone(),
            Some(Duration::from_secs(60)),
        ))
    }

    async fn update_jobs_status(&self, jobs: &mut [&mut AsyncJob]) -> Result<()> {
        if let Some(Some(make_error)) = self.poll_errors.lock().unwrap().pop_front() {
            return Err(make_error());
        }

        for job in jobs.iter_mut() {
            self.record(format!("poll:{}", job.api_job_id()));
            let status = match self.statuses.lock().unwrap().get_mut(job.api_job_id()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().copied().unwrap_or(AsyncJobStatus::Completed),
                None => AsyncJobStatus::Completed,
            };
            job.update_status(status);
        }
        Ok(())
    }

    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonValue>> {
        self.record(format!("fetch:{}", job.api_job_id()));
        Ok(vec![
            json!({"job": job.api_job_id(), "n": 1}),
            json!({"job": job.api_job_id(), "n": 2}),
        ])
    }

    async fn abort(&self, job: &AsyncJob) -> Result<()> {
        self.record(format!("abort:{}", job.api_job_id()));
        Ok(())
    }

    async fn delete(&self, job: &AsyncJob) -> Result<()> {
        self.record(format!("delete:{}", job.api_job_id()));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn slices(ids: &[&str]) -> SliceIter {
    let slices: Vec<StreamSlice> = ids
        .iter()
        .map(|id| StreamSlice::new().with_partition("id", *id))
        .collect();
    Box::new(slices.into_iter())
}

struct Harness {
    repository: Arc<MockJobRepository>,
    tracker: Arc<JobTracker>,
    messages: Arc<InMemoryMessageRepository>,
}

impl Harness {
    fn new(repository: MockJobRepository, limit: usize) -> Self {
        Self {
            repository: Arc::new(repository),
            tracker: Arc::new(JobTracker::new(limit)),
            messages: Arc::new(InMemoryMessageRepository::new()),
        }
    }

    fn orchestrator(&self, ids: &[&str]) -> AsyncJobOrchestrator {
        AsyncJobOrchestrator::new(
            self.repository.clone(),
            slices(ids),
            self.tracker.clone(),
            self.messages.clone(),
        )
    }
}

async fn run(orchestrator: AsyncJobOrchestrator) -> Vec<Result<AsyncPartition>> {
    orchestrator
        .create_and_get_completed_partitions()
        .collect()
        .await
}

fn job_ids(partition: &AsyncPartition) -> Vec<String> {
    partition
        .jobs()
        .map(|job| job.api_job_id().to_string())
        .collect()
}

use AsyncJobStatus::{Completed, Failed, Running};

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_budget_of_one_runs_slices_one_after_the_other() {
    let harness = Harness::new(MockJobRepository::default(), 1);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    assert_eq!(results.len(), 2);
    let first = results[0].as_ref().unwrap();
    let second = results[1].as_ref().unwrap();
    assert_eq!(slice_id(first.stream_slice()), "a");
    assert_eq!(slice_id(second.stream_slice()), "b");
    assert_eq!(
        harness.repository.calls(),
        vec!["start:a-1", "poll:a-1", "start:b-1", "poll:b-1"]
    );
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partitions_are_yielded_in_completion_order() {
    let repository = MockJobRepository::default().with_statuses("a-1", &[Running, Completed]);
    let harness = Harness::new(repository, 2);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    let order: Vec<String> = results
        .iter()
        .map(|r| slice_id(r.as_ref().unwrap().stream_slice()))
        .collect();
    assert_eq!(order, vec!["b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_finished_orchestrator_keeps_returning_none() {
    let harness = Harness::new(MockJobRepository::default(), 1);
    let mut orchestrator = harness.orchestrator(&["a"]);

    assert!(orchestrator.next_completed_partition().await.unwrap().is_ok());
    assert!(orchestrator.next_completed_partition().await.is_none());
    assert!(orchestrator.next_completed_partition().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_slices_yields_nothing() {
    let harness = Harness::new(MockJobRepository::default(), 1);
    let results = run(harness.orchestrator(&[])).await;
    assert!(results.is_empty());
    assert!(harness.repository.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_polling_interval_between_rounds() {
    let repository =
        MockJobRepository::default().with_statuses("a-1", &[Running, Running, Completed]);
    let harness = Harness::new(repository, 1);
    let mut orchestrator = harness
        .orchestrator(&["a"])
        .with_polling_interval(Duration::from_secs(20));

    let started = tokio::time::Instant::now();
    let partition = orchestrator.next_completed_partition().await;

    assert!(partition.unwrap().is_ok());
    assert_eq!(started.elapsed(), Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_round_keeps_running_partitions() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Failed])
        .with_start_delay("a-2", Duration::from_secs(60));
    let harness = Harness::new(repository, 2);
    let mut orchestrator = harness
        .orchestrator(&["a", "b"])
        .with_polling_interval(Duration::from_secs(1));

    let first = orchestrator.next_completed_partition().await.unwrap().unwrap();
    assert_eq!(job_ids(&first), vec!["b-1"]);

    // Dropped while the replacement of a-1 is being created
    let dropped = tokio::time::timeout(
        Duration::from_secs(30),
        orchestrator.next_completed_partition(),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(harness.tracker.outstanding(), 1);

    let second = orchestrator.next_completed_partition().await.unwrap().unwrap();
    assert_eq!(job_ids(&second), vec!["a-3"]);
    assert!(orchestrator.next_completed_partition().await.is_none());
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_creation_keeps_slice_and_budget() {
    let repository = MockJobRepository::default().with_start_delay("a-1", Duration::from_secs(60));
    let harness = Harness::new(repository, 1);
    let mut orchestrator = harness.orchestrator(&["a", "b"]);

    let dropped = tokio::time::timeout(
        Duration::from_secs(30),
        orchestrator.next_completed_partition(),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(harness.tracker.outstanding(), 0);

    let mut completed = Vec::new();
    while let Some(partition) = orchestrator.next_completed_partition().await {
        completed.extend(job_ids(&partition.unwrap()));
    }
    assert_eq!(completed, vec!["a-2", "b-1"]);
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_parent_starts_one_slice_at_a_time() {
    let repository = MockJobRepository::default().with_statuses("a-1", &[Running, Completed]);
    let harness = Harness::new(repository, 3);
    let orchestrator = harness.orchestrator(&["a", "b", "c"]).with_bulk_parent(true);

    let results = run(orchestrator).await;

    assert_eq!(results.len(), 3);
    assert_eq!(
        harness.repository.calls(),
        vec![
            "start:a-1",
            "poll:a-1",
            "poll:a-1",
            "start:b-1",
            "poll:b-1",
            "start:c-1",
            "poll:c-1",
        ]
    );
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_retried_until_it_completes() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Failed])
        .with_statuses("a-2", &[Failed]);
    let harness = Harness::new(repository, 1);

    let results = run(harness.orchestrator(&["a"])).await;

    assert_eq!(results.len(), 1);
    let partition = results[0].as_ref().unwrap();
    assert_eq!(job_ids(partition), vec!["a-3"]);
    assert_eq!(partition.attempts("a-3"), Some(3));
    assert_eq!(
        harness.repository.calls_starting_with("start:"),
        vec!["start:a-1", "start:a-2", "start:a-3"]
    );
    assert!(harness.repository.calls_starting_with("abort:").is_empty());
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partition_is_dropped_after_max_attempts() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Failed])
        .with_statuses("a-2", &[Failed])
        .with_statuses("a-3", &[Failed]);
    let harness = Harness::new(repository, 2);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    assert_eq!(results.len(), 2);
    assert_eq!(slice_id(results[0].as_ref().unwrap().stream_slice()), "b");
    match &results[1] {
        Err(Error::IncompleteRun { errors }) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("At least one job could not be completed for slice"));
            assert!(errors[0].contains("a-3: FAILED"));
        }
        other => panic!("Expected IncompleteRun, got {other:?}"),
    }
    assert_eq!(harness.repository.calls_starting_with("start:a").len(), 3);
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_job_max_retry_of_one_never_retries() {
    let repository = MockJobRepository::default().with_statuses("a-1", &[Failed]);
    let harness = Harness::new(repository, 1);
    let orchestrator = harness.orchestrator(&["a"]).with_job_max_retry(1);

    let results = run(orchestrator).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::IncompleteRun { .. })));
    assert_eq!(harness.repository.calls_starting_with("start:"), vec!["start:a-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_job_is_aborted_then_replaced() {
    let repository = MockJobRepository::default().with_statuses("a-1", &[Running]);
    let harness = Harness::new(repository, 1);

    let results = run(harness.orchestrator(&["a"])).await;

    assert_eq!(results.len(), 1);
    assert_eq!(job_ids(results[0].as_ref().unwrap()), vec!["a-2"]);
    assert_eq!(harness.repository.calls_starting_with("abort:"), vec!["abort:a-1"]);

    let calls = harness.repository.calls();
    let aborted = calls.iter().position(|c| c == "abort:a-1").unwrap();
    let replaced = calls.iter().position(|c| c == "start:a-2").unwrap();
    assert!(aborted < replaced);
    assert_eq!(harness.tracker.outstanding(), 0);
}

// ============================================================================
// Errors
// ============================================================================

fn server_error() -> Error {
    Error::http_status(500, "boom")
}

fn bad_credentials() -> Error {
    Error::config("invalid credentials")
}

fn unauthorized() -> Error {
    Error::http_status(401, "invalid session id")
}

#[tokio::test(start_paused = true)]
async fn test_creation_failure_emits_trace_and_is_retried() {
    let repository = MockJobRepository::default().with_start_error("a-1", server_error);
    let harness = Harness::new(repository, 1);

    let results = run(harness.orchestrator(&["a"])).await;

    assert_eq!(results.len(), 1);
    assert_eq!(job_ids(results[0].as_ref().unwrap()), vec!["a-2"]);

    let messages = harness.messages.consume_queue();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        Message::Trace { message, .. } => assert_eq!(
            message,
            "Failed to start job for slice: {partition={\"id\":\"a\"}, cursor_slice={}}"
        ),
        other => panic!("Expected trace, got {other:?}"),
    }
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaking_creation_failure_releases_budget() {
    let repository = MockJobRepository::default().with_start_error("a-1", bad_credentials);
    let harness = Harness::new(repository, 1);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Config { .. })));
    assert_eq!(harness.tracker.outstanding(), 0);
    assert!(harness.messages.consume_queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_creation_breaks_the_run() {
    let repository = MockJobRepository::default()
        .with_start_error("a-1", unauthorized)
        .with_start_error("a-2", unauthorized)
        .with_start_error("a-3", unauthorized);
    let harness = Harness::new(repository, 1);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::HttpStatus { status: 401, .. })));
    assert_eq!(harness.repository.calls_starting_with("start:"), vec!["start:a-1"]);
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaking_error_aborts_running_jobs() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Running])
        .with_statuses("b-1", &[Running])
        .with_poll_errors(vec![None, Some(bad_credentials as ErrorFactory)]);
    let harness = Harness::new(repository, 2);

    let results = run(harness.orchestrator(&["a", "b", "c"])).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Config { .. })));
    assert_eq!(
        harness.repository.calls_starting_with("abort:"),
        vec!["abort:a-1", "abort:b-1"]
    );
    assert!(harness.repository.calls_starting_with("start:c").is_empty());
    assert_eq!(harness.tracker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_configured_error_kind_is_breaking() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Running])
        .with_poll_errors(vec![None, Some(server_error as ErrorFactory)]);
    let harness = Harness::new(repository, 1);
    let orchestrator = harness
        .orchestrator(&["a"])
        .with_exceptions_to_break_on([ErrorKind::HttpStatus]);

    let results = run(orchestrator).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::HttpStatus { status: 500, .. })));
    assert_eq!(harness.repository.calls_starting_with("abort:"), vec!["abort:a-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_non_breaking_errors_are_reported_after_all_partitions() {
    let repository = MockJobRepository::default()
        .with_statuses("a-1", &[Running, Completed])
        .with_statuses("b-1", &[Running, Completed])
        .with_poll_errors(vec![None, Some(server_error as ErrorFactory)]);
    let harness = Harness::new(repository, 2);

    let results = run(harness.orchestrator(&["a", "b"])).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    let error = results[2].as_ref().unwrap_err();
    assert!(error.is_config_error());
    match error {
        Error::IncompleteRun { errors } => {
            assert_eq!(errors, &vec!["HTTP 500: boom".to_string()]);
        }
        other => panic!("Expected IncompleteRun, got {other:?}"),
    }
    assert!(harness.repository.calls_starting_with("abort:").is_empty());
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fetch_records_deletes_each_job() {
    let harness = Harness::new(MockJobRepository::default(), 1);
    let mut orchestrator = harness.orchestrator(&["a"]);
    let partition = orchestrator.next_completed_partition().await.unwrap().unwrap();

    let repository: Arc<dyn AsyncJobRepository> = harness.repository.clone();
    let records: Vec<JsonValue> = AsyncJobOrchestrator::fetch_records(repository, partition)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        records,
        vec![json!({"job": "a-1", "n": 1}), json!({"job": "a-1", "n": 2})]
    );
    assert_eq!(
        harness.repository.calls(),
        vec!["start:a-1", "poll:a-1", "fetch:a-1", "delete:a-1"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shared_tracker_bounds_two_orchestrators() {
    let harness = Harness::new(MockJobRepository::default(), 1);
    let first = harness.orchestrator(&["a"]);
    let second = harness.orchestrator(&["b"]);

    let (left, right) = tokio::join!(run(first), run(second));

    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 1);
    assert!(left[0].is_ok() && right[0].is_ok());
    assert_eq!(harness.tracker.outstanding(), 0);
}
