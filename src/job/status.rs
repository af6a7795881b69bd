//! Async job status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a remote asynchronous job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncJobStatus {
    /// Job is being processed by the API
    Running,
    /// Job finished and its results can be downloaded
    Completed,
    /// Job failed on the API side or could not be created
    Failed,
    /// Job exceeded its timeout; it may still be running on the API side
    #[serde(rename = "timeout")]
    TimedOut,
}

impl AsyncJobStatus {
    /// Every status, in precedence order for partition aggregation
    pub const ALL: [AsyncJobStatus; 4] = [
        AsyncJobStatus::Failed,
        AsyncJobStatus::TimedOut,
        AsyncJobStatus::Running,
        AsyncJobStatus::Completed,
    ];

    /// Whether the job reached a final status
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Running => false,
            Self::Completed | Self::Failed | Self::TimedOut => true,
        }
    }

    /// Whether the API may still be spending resources on the job
    pub fn is_running_on_api_side(self) -> bool {
        match self {
            Self::Running | Self::TimedOut => true,
            Self::Completed | Self::Failed => false,
        }
    }

    /// Parse the names used in status mappings (`running`, `completed`, `failed`, `timeout`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timeout" | "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

// The orchestrator classifies partitions with an exhaustive match; adding a
// status means revisiting that match and this count together.
const _: () = assert!(AsyncJobStatus::ALL.len() == 4);

impl fmt::Display for AsyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}
