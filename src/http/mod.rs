//! HTTP client module
//!
//! Provides the HTTP client shared by every requester of a stream.
//!
//! # Features
//!
//! - **Automatic Retries**: 429, 5xx, timeouts and connection errors
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Backoff Strategies**: Constant, linear, and exponential backoff

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, HttpRequest, HttpResponse};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
