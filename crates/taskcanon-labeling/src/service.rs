//! Asynchronous task model of the labeling service.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::LabelingError;

/// Identifier returned by [`LabelingService::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Status strings as reported by the service. Unknown strings are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => Some(TaskStatus::Queued),
            "processing" | "running" | "in_progress" => Some(TaskStatus::Processing),
            "completed" | "succeeded" | "done" => Some(TaskStatus::Completed),
            "failed" | "error" | "cancelled" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    /// Response text, present once the task is completed.
    pub text: Option<String>,
    pub error: Option<String>,
}

impl TaskSnapshot {
    pub fn pending(status: TaskStatus) -> Self {
        Self {
            status,
            text: None,
            error: None,
        }
    }

    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Completed,
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            text: None,
            error: Some(error.into()),
        }
    }
}

/// Submit-then-poll labeling backend.
#[async_trait]
pub trait LabelingService: Send + Sync {
    async fn submit(&self, prompt: &str) -> Result<TaskId, LabelingError>;

    async fn poll(&self, task: &TaskId) -> Result<TaskSnapshot, LabelingError>;
}
