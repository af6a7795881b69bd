//! Messages emitted to the caller besides records
//!
//! The orchestrator reports some failures out of band (a job that could not
//! be created is retried, but the platform still wants to know). Messages go
//! through a [`MessageRepository`] so the binary can print them and tests can
//! inspect them.

use crate::error::FailureType;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Log level for emitted messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// General information
    Info,
    /// Warning
    Warn,
    /// Error (non-fatal)
    Error,
}

/// Out-of-band message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
    /// Error trace, reported without stopping the run
    Trace {
        /// Who is to blame
        failure_type: FailureType,
        /// User facing message
        message: String,
        /// Details for debugging
        internal_message: String,
    },
}

impl Message {
    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error trace
    pub fn trace(
        failure_type: FailureType,
        message: impl Into<String>,
        internal_message: impl Into<String>,
    ) -> Self {
        Self::Trace {
            failure_type,
            message: message.into(),
            internal_message: internal_message.into(),
        }
    }

    /// Check if this is a trace message
    pub fn is_trace(&self) -> bool {
        matches!(self, Self::Trace { .. })
    }
}

/// Sink for out-of-band messages
pub trait MessageRepository: Send + Sync {
    /// Record a message
    fn emit_message(&self, message: Message);
}

/// Keeps messages until the caller drains them
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    queue: Mutex<VecDeque<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued message, oldest first
    pub fn consume_queue(&self) -> Vec<Message> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn emit_message(&self, message: Message) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
    }
}

/// Forwards messages to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessageRepository;

impl MessageRepository for LogMessageRepository {
    fn emit_message(&self, message: Message) {
        match message {
            Message::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
            Message::Trace {
                failure_type,
                message,
                internal_message,
            } => tracing::error!(%failure_type, internal = %internal_message, "{message}"),
        }
    }
}
