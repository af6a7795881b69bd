//! HTTP client with retry and rate limiting
//!
//! Every call made on behalf of a stream (job creation, polling, download,
//! paginated reads) goes through [`HttpClient::send`], which:
//! - waits for the shared rate limiter
//! - retries 429, 5xx, timeouts and connection errors with backoff
//! - reads the body so callers get a plain [`HttpResponse`]

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::{BackoffType, JsonValue, Method};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative paths
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            backoff_type: BackoffType::Exponential,
            rate_limit: None,
            default_headers: BTreeMap::new(),
            user_agent: format!("solidafy-bulk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// A single outgoing request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL or path relative to the base URL
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<JsonValue>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful response, body already read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<JsonValue> {
        if self.body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

enum Attempt {
    Done(HttpResponse),
    /// `retry_after` comes from the server, backoff applies otherwise
    Retry {
        retry_after: Option<Duration>,
        error: Error,
    },
    Fail(Error),
}

/// HTTP client with retry and rate limiting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Send a request, retrying transient failures
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = self.build_url(&request.url)?;
        let max_retries = self.config.max_retries;

        let mut attempt = 0;
        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait().await;
            }

            match self.attempt(request, &url).await {
                Attempt::Done(response) => {
                    debug!("Request succeeded: {:?} {}", request.method, url);
                    return Ok(response);
                }
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry { retry_after, error } if attempt >= max_retries => {
                    warn!("Giving up on {url} after {} attempts: {error}", attempt + 1);
                    return Err(match error {
                        Error::HttpStatus { status: 429, .. } => Error::RateLimited {
                            retry_after_seconds: retry_after.map_or(0, |d| d.as_secs()),
                        },
                        other => other,
                    });
                }
                Attempt::Retry { retry_after, error } => {
                    let delay = retry_after.unwrap_or_else(|| self.calculate_backoff(attempt));
                    warn!(
                        "Request failed with {error}, attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Send a request and parse the body as JSON
    pub async fn send_json(&self, request: &HttpRequest) -> Result<JsonValue> {
        self.send(request).await?.json()
    }

    async fn attempt(&self, request: &HttpRequest, url: &Url) -> Attempt {
        let mut builder = self
            .client
            .request(request.method.into(), url.clone())
            .timeout(self.config.timeout);
        for (key, value) in self.config.default_headers.iter().chain(&request.headers) {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.timeout.as_millis() as u64;
                return Attempt::Retry {
                    retry_after: None,
                    error: Error::Timeout { timeout_ms },
                };
            }
            Err(e) if e.is_connect() => {
                return Attempt::Retry {
                    retry_after: None,
                    error: Error::Http(e),
                }
            }
            Err(e) => return Attempt::Fail(Error::Http(e)),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let retry_after = retry_after(&headers);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Fail(Error::Http(e)),
        };

        if status.is_success() || status.is_redirection() {
            return Attempt::Done(HttpResponse {
                status: status.as_u16(),
                headers,
                body,
            });
        }

        let error = Error::http_status(status.as_u16(), body);
        if status == StatusCode::TOO_MANY_REQUESTS || is_retryable_status(status) {
            Attempt::Retry { retry_after, error }
        } else {
            Attempt::Fail(error)
        }
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let url = match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                Url::parse(&format!("{base}/{path}"))?
            }
            None => Url::parse(path)?,
        };
        Ok(url)
    }

    /// Backoff delay for a given retry attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff * (attempt + 1),
            BackoffType::Exponential => self.config.initial_backoff * 2u32.saturating_pow(attempt),
        };
        delay.min(self.config.max_backoff)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524
    )
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
