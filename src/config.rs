//! Stream definition configuration
//!
//! A bulk stream is described by one YAML document:
//!
//! ```yaml
//! name: orders
//! http:
//!   base_url: https://api.example.com
//!   headers:
//!     Authorization: "Bearer {{ config.api_key }}"
//! slicer:
//!   type: datetime
//!   start: "{{ config.start_date }}"
//!   step: 30d
//! creation:
//!   path: /exports
//!   method: POST
//!   body:
//!     from: "{{ stream_slice.start_time }}"
//! polling:
//!   path: "/exports/{{ creation_response.id }}"
//! download:
//!   path: "{{ download_target }}"
//! download_target_path: result_urls
//! download_extractor:
//!   type: jsonl
//! status_mapping:
//!   running: [pending, processing]
//!   completed: [done]
//!   failed: [error]
//!   timeout: [expired]
//! ```
//!
//! The connector configuration (`config.*` in templates) is a separate JSON
//! document handed to [`AsyncStreamDefinition::build`].

use crate::error::{Error, ErrorKind, Result};
use crate::extract::ExtractorConfig;
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use crate::job::{AsyncHttpJobRepository, JobTracker, StatusMapping, DEFAULT_POLLING_INTERVAL};
use crate::message::MessageRepository;
use crate::pagination::PaginatorConfig;
use crate::retriever::{AsyncRetriever, RequesterConfig, SimpleRetriever};
use crate::slicer::SlicerConfig;
use crate::template::{render, TemplateContext};
use crate::types::{BackoffType, JsonValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Job timeout applied in test-read mode unless the definition sets one
pub const TEST_READ_JOB_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Stream Definition
// ============================================================================

/// A bulk stream read through remote asynchronous jobs
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncStreamDefinition {
    /// Stream name
    pub name: String,

    /// HTTP client settings shared by every requester
    pub http: HttpConfig,

    /// How the stream is split into jobs
    #[serde(default)]
    pub slicer: SlicerConfig,

    /// Request creating a job for a slice
    pub creation: RequesterConfig,

    /// Request fetching the status of a job
    pub polling: RequesterConfig,

    /// Optional request whose response holds the download targets
    #[serde(default)]
    pub download_target: Option<RequesterConfig>,

    /// Request downloading the records of a completed job
    pub download: RequesterConfig,

    #[serde(default)]
    pub download_paginator: PaginatorConfig,

    #[serde(default)]
    pub download_extractor: ExtractorConfig,

    #[serde(default)]
    pub abort: Option<RequesterConfig>,

    #[serde(default)]
    pub delete: Option<RequesterConfig>,

    /// Path of the job id in the creation response
    #[serde(default = "default_job_id_path")]
    pub job_id_path: String,

    /// Path of the job status in the polling response
    #[serde(default = "default_status_path")]
    pub status_path: String,

    pub status_mapping: StatusMapping,

    /// Path of the download target(s) in the polling (or download target)
    /// response
    #[serde(default)]
    pub download_target_path: Option<String>,

    #[serde(default)]
    pub jobs: JobsConfig,
}

fn default_job_id_path() -> String {
    "id".to_string()
}

fn default_status_path() -> String {
    "status".to_string()
}

// ============================================================================
// HTTP Configuration
// ============================================================================

/// HTTP client settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Base URL for relative request paths
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub retry_backoff: BackoffConfig,

    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// Headers sent with every request, rendered once against the config
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Retry backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default, rename = "type")]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}

impl HttpConfig {
    /// Client configuration with headers rendered against `config`
    pub fn client_config(&self, config: &JsonValue) -> Result<HttpClientConfig> {
        let ctx = TemplateContext::new(config);
        let mut builder = HttpClientConfig::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(self.timeout_seconds))
            .max_retries(self.max_retries)
            .backoff(
                self.retry_backoff.backoff_type,
                Duration::from_millis(self.retry_backoff.initial_ms),
                Duration::from_millis(self.retry_backoff.max_ms),
            );
        if let Some(rate_limit) = &self.rate_limit {
            builder = builder.rate_limit(rate_limit.clone());
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, render(value, &ctx)?);
        }
        Ok(builder.build())
    }
}

// ============================================================================
// Job Settings
// ============================================================================

/// Orchestration settings
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Maximum number of jobs existing at once on the API side
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Attempts per partition
    #[serde(default)]
    pub job_max_retry: Option<u32>,

    /// Job timeout in minutes (60 by default, 15 in test reads)
    #[serde(default)]
    pub job_timeout_minutes: Option<u64>,

    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// Error kinds that stop the whole run instead of failing one partition
    #[serde(default)]
    pub exceptions_to_break_on: Vec<ErrorKind>,

    /// Throttle job creation because the stream reads from a bulk parent
    #[serde(default)]
    pub has_bulk_parent: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            job_max_retry: None,
            job_timeout_minutes: None,
            polling_interval_secs: default_polling_interval_secs(),
            exceptions_to_break_on: Vec::new(),
            has_bulk_parent: false,
        }
    }
}

fn default_concurrency_limit() -> usize {
    1
}

fn default_polling_interval_secs() -> u64 {
    DEFAULT_POLLING_INTERVAL.as_secs()
}

// ============================================================================
// Read Options
// ============================================================================

/// Per-run overrides of a definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Single attempt per job, shorter job timeout
    pub test_read: bool,
    /// Slice limit in test reads (default 5)
    pub max_slices: Option<usize>,
    /// Overrides `jobs.polling_interval_secs`
    pub polling_interval: Option<Duration>,
}

impl ReadOptions {
    pub fn test_read(max_slices: Option<usize>) -> Self {
        Self {
            test_read: true,
            max_slices,
            polling_interval: None,
        }
    }

    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }
}

// ============================================================================
// Building
// ============================================================================

impl AsyncStreamDefinition {
    /// Build the retriever of this stream
    ///
    /// `config` is the connector configuration exposed to templates as
    /// `config`. A fresh job tracker sized by `jobs.concurrency_limit` is used.
    pub fn build(
        &self,
        config: &JsonValue,
        message_repository: Arc<dyn MessageRepository>,
        options: &ReadOptions,
    ) -> Result<AsyncRetriever> {
        let tracker = Arc::new(JobTracker::new(self.jobs.concurrency_limit));
        self.build_with_tracker(config, tracker, message_repository, options)
    }

    /// Build the retriever sharing `tracker` with other streams
    pub fn build_with_tracker(
        &self,
        config: &JsonValue,
        tracker: Arc<JobTracker>,
        message_repository: Arc<dyn MessageRepository>,
        options: &ReadOptions,
    ) -> Result<AsyncRetriever> {
        let repository = self.build_repository(config, options)?;
        let slicer = self.slicer.build(config)?;

        let polling_interval = options
            .polling_interval
            .unwrap_or(Duration::from_secs(self.jobs.polling_interval_secs));
        let mut retriever = AsyncRetriever::new(Arc::new(repository), slicer, tracker, message_repository)
            .with_bulk_parent(self.jobs.has_bulk_parent)
            .with_exceptions_to_break_on(self.jobs.exceptions_to_break_on.iter().copied())
            .with_polling_interval(polling_interval);
        if let Some(job_max_retry) = self.jobs.job_max_retry {
            retriever = retriever.with_job_max_retry(job_max_retry);
        }
        if options.test_read {
            retriever = retriever.with_test_read(options.max_slices);
        }

        debug!(stream = %self.name, ?polling_interval, test_read = options.test_read, "Built async retriever");
        Ok(retriever)
    }

    fn build_repository(&self, config: &JsonValue, options: &ReadOptions) -> Result<AsyncHttpJobRepository> {
        let client = HttpClient::with_config(self.http.client_config(config)?)?;

        let download_retriever = SimpleRetriever::new(
            Arc::new(self.download.build(client.clone())),
            Arc::from(self.download_extractor.build()),
            config.clone(),
        )
        .with_paginator(Arc::from(self.download_paginator.build()?));

        let mut builder = AsyncHttpJobRepository::builder()
            .creation_requester(Arc::new(self.creation.build(client.clone())))
            .polling_requester(Arc::new(self.polling.build(client.clone())))
            .download_retriever(Arc::new(download_retriever))
            .job_id_path(&self.job_id_path)
            .status_path(&self.status_path)
            .status_mapping(self.status_mapping.clone())
            .config(config.clone());

        if let Some(requester) = &self.download_target {
            builder = builder.download_target_requester(Arc::new(requester.build(client.clone())));
        }
        if let Some(requester) = &self.abort {
            builder = builder.abort_requester(Arc::new(requester.build(client.clone())));
        }
        if let Some(requester) = &self.delete {
            builder = builder.delete_requester(Arc::new(requester.build(client.clone())));
        }
        if let Some(path) = &self.download_target_path {
            builder = builder.download_target_path(path);
        }
        if let Some(timeout) = self.job_timeout(options) {
            builder = builder.job_timeout(timeout);
        }

        builder.build()
    }

    /// Explicit timeout, else the test-read timeout in test reads
    fn job_timeout(&self, options: &ReadOptions) -> Option<Duration> {
        match self.jobs.job_timeout_minutes {
            Some(minutes) => Some(Duration::from_secs(minutes * 60)),
            None if options.test_read => Some(TEST_READ_JOB_TIMEOUT),
            None => None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load a stream definition from a YAML file
pub fn load_definition(path: impl AsRef<Path>) -> Result<AsyncStreamDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read definition file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_definition_from_str(&content)
}

/// Load a stream definition from a YAML string
pub fn load_definition_from_str(yaml: &str) -> Result<AsyncStreamDefinition> {
    let def: AsyncStreamDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse stream definition YAML: {e}")))?;

    validate_definition(&def)?;
    Ok(def)
}

/// Load the connector configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<JsonValue> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Checks that do not need the connector configuration
fn validate_definition(def: &AsyncStreamDefinition) -> Result<()> {
    if def.name.is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    if def.http.base_url.is_empty() {
        return Err(Error::config(format!(
            "Stream '{}' base_url cannot be empty",
            def.name
        )));
    }

    let requesters = [
        ("creation", Some(&def.creation)),
        ("polling", Some(&def.polling)),
        ("download", Some(&def.download)),
        ("download_target", def.download_target.as_ref()),
        ("abort", def.abort.as_ref()),
        ("delete", def.delete.as_ref()),
    ];
    for (name, requester) in requesters {
        if requester.is_some_and(|r| r.path.is_empty()) {
            return Err(Error::invalid_value(name, "path cannot be empty"));
        }
    }

    if def.download_target.is_some() && def.download_target_path.is_none() {
        return Err(Error::invalid_value(
            "download_target_path",
            "required when a download_target requester is configured",
        ));
    }

    if def.jobs.concurrency_limit == 0 {
        return Err(Error::invalid_value(
            "jobs.concurrency_limit",
            "must be at least 1",
        ));
    }
    if def.jobs.job_max_retry == Some(0) {
        return Err(Error::invalid_value("jobs.job_max_retry", "must be at least 1"));
    }

    def.status_mapping.build()?;
    def.download_paginator.build()?;
    Ok(())
}
