//! Error types for Solidafy Bulk
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Besides the usual Display message, every error carries two classifications
//! used by the job orchestrator:
//! - [`ErrorKind`] - a fieldless mirror of the variant, so callers can list the
//!   kinds that must abort a run (`exceptions_to_break_on`)
//! - [`FailureType`] - who is to blame (config, system, transient). Config-class
//!   failures always abort a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Who is responsible for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// The user configuration (or the remote account) is wrong
    ConfigError,
    /// A bug or an unexpected remote behavior
    SystemError,
    /// Likely to succeed if tried again later
    TransientError,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError => write!(f, "config_error"),
            Self::SystemError => write!(f, "system_error"),
            Self::TransientError => write!(f, "transient_error"),
        }
    }
}

/// The main error type for Solidafy Bulk
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request option '{key}' is defined more than once in {option}")]
    RequestOptionCollision { option: String, key: String },

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    #[error("JSONPath error: {message}")]
    JsonPath { message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // Async Job Errors
    // ============================================================================
    #[error("Concurrent job limit of {limit} reached")]
    ConcurrentJobLimitReached { limit: usize },

    #[error("Job tracker error: {message}")]
    JobTracker { message: String },

    #[error("Partition error: {message}")]
    Partition { message: String },

    #[error("API job status '{status}' has not been mapped")]
    UnmappedJobStatus { status: String },

    #[error("{message}")]
    Traced {
        message: String,
        internal_message: String,
        failure_type: FailureType,
    },

    #[error("Bulk export is incomplete:\n{}", .errors.join("\n"))]
    IncompleteRun { errors: Vec<String> },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Fieldless discriminant of [`Error`]
///
/// Used to configure which errors must stop an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    MissingConfigField,
    InvalidConfigValue,
    YamlParse,
    JsonParse,
    Http,
    HttpStatus,
    RateLimited,
    Timeout,
    InvalidUrl,
    RequestOptionCollision,
    JsonPath,
    Decode,
    ConcurrentJobLimitReached,
    JobTracker,
    Partition,
    UnmappedJobStatus,
    Traced,
    IncompleteRun,
    UndefinedVariable,
    Io,
    FileNotFound,
    Other,
    Anyhow,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a JSONPath error
    pub fn json_path(message: impl Into<String>) -> Self {
        Self::JsonPath {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Create a job tracker error
    pub fn job_tracker(message: impl Into<String>) -> Self {
        Self::JobTracker {
            message: message.into(),
        }
    }

    /// Create a partition error
    pub fn partition(message: impl Into<String>) -> Self {
        Self::Partition {
            message: message.into(),
        }
    }

    /// Create a traced error with an explicit failure type
    pub fn traced(
        message: impl Into<String>,
        internal_message: impl Into<String>,
        failure_type: FailureType,
    ) -> Self {
        Self::Traced {
            message: message.into(),
            internal_message: internal_message.into(),
            failure_type,
        }
    }

    /// Fieldless kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::MissingConfigField { .. } => ErrorKind::MissingConfigField,
            Error::InvalidConfigValue { .. } => ErrorKind::InvalidConfigValue,
            Error::YamlParse(_) => ErrorKind::YamlParse,
            Error::JsonParse(_) => ErrorKind::JsonParse,
            Error::Http(_) => ErrorKind::Http,
            Error::HttpStatus { .. } => ErrorKind::HttpStatus,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::RequestOptionCollision { .. } => ErrorKind::RequestOptionCollision,
            Error::JsonPath { .. } => ErrorKind::JsonPath,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::ConcurrentJobLimitReached { .. } => ErrorKind::ConcurrentJobLimitReached,
            Error::JobTracker { .. } => ErrorKind::JobTracker,
            Error::Partition { .. } => ErrorKind::Partition,
            Error::UnmappedJobStatus { .. } => ErrorKind::UnmappedJobStatus,
            Error::Traced { .. } => ErrorKind::Traced,
            Error::IncompleteRun { .. } => ErrorKind::IncompleteRun,
            Error::UndefinedVariable { .. } => ErrorKind::UndefinedVariable,
            Error::Io(_) => ErrorKind::Io,
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::Other(_) => ErrorKind::Other,
            Error::Anyhow(_) => ErrorKind::Anyhow,
        }
    }

    /// Who is responsible for this error
    pub fn failure_type(&self) -> FailureType {
        match self {
            Error::Traced { failure_type, .. } => *failure_type,
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_)
            | Error::RequestOptionCollision { .. }
            | Error::UndefinedVariable { .. }
            | Error::IncompleteRun { .. }
            | Error::HttpStatus {
                status: 401 | 403,
                ..
            } => FailureType::ConfigError,
            _ if self.is_retryable() => FailureType::TransientError,
            _ => FailureType::SystemError,
        }
    }

    /// Check if this error is a config-class failure
    pub fn is_config_error(&self) -> bool {
        self.failure_type() == FailureType::ConfigError
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Debug-style message including internal details, used when aggregating
    pub fn internal_message(&self) -> String {
        match self {
            Error::Traced {
                message,
                internal_message,
                failure_type,
            } => format!("Traced({failure_type}, message={message:?}, internal={internal_message:?})"),
            other => format!("{:?}({other})", other.kind()),
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for Solidafy Bulk
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
