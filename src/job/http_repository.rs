//! Job repository over a generic HTTP bulk API
//!
//! The API is described by requesters:
//! - creation: starts a job for a slice, the job id is read from its response
//! - polling: reports a job status, mapped onto [`AsyncJobStatus`]
//! - download target (optional): lists what to download once complete
//! - download: a paginated retriever run once per download target
//! - abort / delete (optional)
//!
//! Requests are rendered with `config`, `stream_slice`, `job_id`,
//! `creation_response`, `polling_response` and `download_target`.

use super::async_job::AsyncJob;
use super::repository::AsyncJobRepository;
use super::status::AsyncJobStatus;
use crate::error::{Error, Result};
use crate::extract::path::{select, select_all};
use crate::retriever::{RequestOptions, Requester, SimpleRetriever};
use crate::template::TemplateContext;
use crate::types::{JsonValue, StreamSlice};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// API status strings per job status
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusMapping {
    #[serde(default)]
    pub running: Vec<String>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub timeout: Vec<String>,
}

impl StatusMapping {
    /// Lookup table from API status to job status
    ///
    /// An API status listed more than once is a configuration error.
    pub fn build(&self) -> Result<HashMap<String, AsyncJobStatus>> {
        let groups = [
            (AsyncJobStatus::Running, &self.running),
            (AsyncJobStatus::Completed, &self.completed),
            (AsyncJobStatus::Failed, &self.failed),
            (AsyncJobStatus::TimedOut, &self.timeout),
        ];

        let mut mapping = HashMap::new();
        for (status, api_statuses) in groups {
            for api_status in api_statuses {
                if let Some(existing) = mapping.insert(api_status.clone(), status) {
                    return Err(Error::config(format!(
                        "API status {api_status} is already set for CDK status {existing}. \
                         Please ensure API statuses are only provided once"
                    )));
                }
            }
        }
        Ok(mapping)
    }
}

/// [`AsyncJobRepository`] over HTTP requesters
pub struct AsyncHttpJobRepository {
    creation_requester: Arc<dyn Requester>,
    polling_requester: Arc<dyn Requester>,
    download_retriever: Arc<SimpleRetriever>,
    download_target_requester: Option<Arc<dyn Requester>>,
    abort_requester: Option<Arc<dyn Requester>>,
    delete_requester: Option<Arc<dyn Requester>>,
    job_id_path: String,
    status_path: String,
    status_mapping: HashMap<String, AsyncJobStatus>,
    download_target_path: Option<String>,
    job_timeout: Option<Duration>,
    config: JsonValue,
    creation_responses: Mutex<HashMap<String, JsonValue>>,
    polling_responses: Mutex<HashMap<String, JsonValue>>,
}

impl AsyncHttpJobRepository {
    pub fn builder() -> AsyncHttpJobRepositoryBuilder {
        AsyncHttpJobRepositoryBuilder::default()
    }

    fn context(&self, job: &AsyncJob) -> TemplateContext {
        TemplateContext::new(&self.config)
            .with_slice(job.job_parameters())
            .with_var("job_id", job.api_job_id())
            .with_var("creation_response", self.creation_response(job.api_job_id()))
            .with_var("polling_response", self.polling_response(job.api_job_id()))
    }

    async fn poll(&self, job: &AsyncJob) -> Result<(AsyncJobStatus, JsonValue)> {
        let response = self
            .polling_requester
            .send_request(&self.context(job), &RequestOptions::default())
            .await?
            .json()?;

        let api_status = match select(&response, &self.status_path) {
            Some(JsonValue::String(status)) => status.clone(),
            Some(JsonValue::Null) | None => {
                return Err(Error::decode(format!(
                    "No job status at '{}' in polling response for job {}",
                    self.status_path,
                    job.api_job_id()
                )))
            }
            Some(other) => other.to_string(),
        };
        let status = self
            .status_mapping
            .get(&api_status)
            .copied()
            .ok_or(Error::UnmappedJobStatus { status: api_status })?;
        Ok((status, response))
    }

    /// What to download for a completed job; `Null` is a single download
    /// without target
    async fn download_targets(&self, job: &AsyncJob) -> Result<Vec<JsonValue>> {
        let Some(path) = &self.download_target_path else {
            return Ok(vec![JsonValue::Null]);
        };
        let response = match &self.download_target_requester {
            Some(requester) => {
                requester
                    .send_request(&self.context(job), &RequestOptions::default())
                    .await?
                    .json()?
            }
            None => self.polling_response(job.api_job_id()),
        };
        select_all(&response, path)
    }

    fn creation_response(&self, job_id: &str) -> JsonValue {
        lock(&self.creation_responses)
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    fn polling_response(&self, job_id: &str) -> JsonValue {
        lock(&self.polling_responses)
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    fn clean_up(&self, job_id: &str) {
        lock(&self.creation_responses).remove(job_id);
        lock(&self.polling_responses).remove(job_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl AsyncJobRepository for AsyncHttpJobRepository {
    async fn start(&self, stream_slice: &StreamSlice) -> Result<AsyncJob> {
        let ctx = TemplateContext::new(&self.config).with_slice(stream_slice);
        let response = self
            .creation_requester
            .send_request(&ctx, &RequestOptions::default())
            .await?
            .json()?;

        let job_id = match select(&response, &self.job_id_path) {
            Some(JsonValue::String(id)) => id.clone(),
            Some(JsonValue::Number(id)) => id.to_string(),
            _ => {
                return Err(Error::decode(format!(
                    "No job id at '{}' in creation response",
                    self.job_id_path
                )))
            }
        };

        debug!(job_id = %job_id, slice = %stream_slice, "Created job");
        lock(&self.creation_responses).insert(job_id.clone(), response);
        Ok(AsyncJob::new(job_id, stream_slice.clone(), self.job_timeout))
    }

    async fn update_jobs_status(&self, jobs: &mut [&mut AsyncJob]) -> Result<()> {
        for job in jobs.iter_mut() {
            let (status, response) = self.poll(job).await?;
            if status != job.status() {
                info!(
                    "Status of job {} changed from {} to {}",
                    job.api_job_id(),
                    job.status(),
                    status
                );
            } else {
                debug!("Status of job {} is still {}", job.api_job_id(), status);
            }
            job.update_status(status);
            if status == AsyncJobStatus::Completed {
                lock(&self.polling_responses).insert(job.api_job_id().to_string(), response);
            }
        }
        Ok(())
    }

    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonValue>> {
        let targets = self.download_targets(job).await?;
        let creation_response = self.creation_response(job.api_job_id());
        let polling_response = self.polling_response(job.api_job_id());

        let mut records = Vec::new();
        for target in targets {
            let mut slice = job
                .job_parameters()
                .clone()
                .with_extra("job_id", job.api_job_id())
                .with_extra("creation_response", creation_response.clone())
                .with_extra("polling_response", polling_response.clone());
            if !target.is_null() {
                slice = slice.with_extra("download_target", target);
            }
            let batch: Vec<JsonValue> = self.download_retriever.read_records(slice).try_collect().await?;
            records.extend(batch);
        }

        debug!(
            job_id = job.api_job_id(),
            records = records.len(),
            "Fetched job records"
        );
        Ok(records)
    }

    async fn abort(&self, job: &AsyncJob) -> Result<()> {
        if let Some(requester) = &self.abort_requester {
            requester
                .send_request(&self.context(job), &RequestOptions::default())
                .await?;
        }
        Ok(())
    }

    async fn delete(&self, job: &AsyncJob) -> Result<()> {
        if let Some(requester) = &self.delete_requester {
            requester
                .send_request(&self.context(job), &RequestOptions::default())
                .await?;
        }
        self.clean_up(job.api_job_id());
        Ok(())
    }
}

impl std::fmt::Debug for AsyncHttpJobRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncHttpJobRepository")
            .field("job_id_path", &self.job_id_path)
            .field("status_path", &self.status_path)
            .field("download_target_path", &self.download_target_path)
            .field("job_timeout", &self.job_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AsyncHttpJobRepository`]
#[derive(Default)]
pub struct AsyncHttpJobRepositoryBuilder {
    creation_requester: Option<Arc<dyn Requester>>,
    polling_requester: Option<Arc<dyn Requester>>,
    download_retriever: Option<Arc<SimpleRetriever>>,
    download_target_requester: Option<Arc<dyn Requester>>,
    abort_requester: Option<Arc<dyn Requester>>,
    delete_requester: Option<Arc<dyn Requester>>,
    job_id_path: Option<String>,
    status_path: Option<String>,
    status_mapping: StatusMapping,
    download_target_path: Option<String>,
    job_timeout: Option<Duration>,
    config: JsonValue,
}

impl AsyncHttpJobRepositoryBuilder {
    pub fn creation_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.creation_requester = Some(requester);
        self
    }

    pub fn polling_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.polling_requester = Some(requester);
        self
    }

    pub fn download_retriever(mut self, retriever: Arc<SimpleRetriever>) -> Self {
        self.download_retriever = Some(retriever);
        self
    }

    pub fn download_target_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.download_target_requester = Some(requester);
        self
    }

    pub fn abort_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.abort_requester = Some(requester);
        self
    }

    pub fn delete_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.delete_requester = Some(requester);
        self
    }

    pub fn job_id_path(mut self, path: impl Into<String>) -> Self {
        self.job_id_path = Some(path.into());
        self
    }

    pub fn status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    pub fn status_mapping(mut self, mapping: StatusMapping) -> Self {
        self.status_mapping = mapping;
        self
    }

    pub fn download_target_path(mut self, path: impl Into<String>) -> Self {
        self.download_target_path = Some(path.into());
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AsyncHttpJobRepository> {
        if self.download_target_requester.is_some() && self.download_target_path.is_none() {
            return Err(Error::invalid_value(
                "download_target_path",
                "required when a download_target requester is configured",
            ));
        }

        Ok(AsyncHttpJobRepository {
            creation_requester: self
                .creation_requester
                .ok_or_else(|| Error::missing_field("creation_requester"))?,
            polling_requester: self
                .polling_requester
                .ok_or_else(|| Error::missing_field("polling_requester"))?,
            download_retriever: self
                .download_retriever
                .ok_or_else(|| Error::missing_field("download_retriever"))?,
            download_target_requester: self.download_target_requester,
            abort_requester: self.abort_requester,
            delete_requester: self.delete_requester,
            job_id_path: self.job_id_path.unwrap_or_else(|| "id".to_string()),
            status_path: self.status_path.unwrap_or_else(|| "status".to_string()),
            status_mapping: self.status_mapping.build()?,
            download_target_path: self.download_target_path,
            job_timeout: self.job_timeout,
            config: self.config,
            creation_responses: Mutex::new(HashMap::new()),
            polling_responses: Mutex::new(HashMap::new()),
        })
    }
}
