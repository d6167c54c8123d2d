//! Taskcanon Labeling: escalation of ambiguous groups to an external
//! phrase-labeling service
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ESCALATION                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  groups ──► render_prompt ──► Escalator::run                     │
//! │                                  │                               │
//! │              submit ──► Submitted ──► Polling ──┬─► Completed    │
//! │                 ▲                               ├─► Failed ──┐   │
//! │                 └──────── backoff (attempts) ◄──┘            │   │
//! │                                                              │   │
//! │   deadline ──► TimedOut        cancel ──► Cancelled          │   │
//! │                                                              ▼   │
//! │  Completed text ──► extract_mapping ──► {phrase: label}          │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service itself sits behind [`LabelingService`], so the poll loop can be
//! driven by the HTTP client in production and by in-memory fakes in tests.

pub mod escalation;
pub mod extract;
pub mod prompt;
pub mod service;

#[cfg(feature = "http")]
pub mod client;

pub use escalation::{
    Backoff, CancelHandle, CancelSignal, EscalationOutcome, EscalationPolicy, EscalationState,
    Escalator,
};
pub use extract::{extract_mapping, response_text, LabelMapping};
pub use prompt::{context_keys, render_prompt, DEFAULT_RESERVED_TOKENS};
pub use service::{LabelingService, TaskId, TaskSnapshot, TaskStatus};

#[cfg(feature = "http")]
pub use client::{HttpLabelingClient, LabelingConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelingError {
    #[error("network error: {0}")]
    Network(String),
    #[error("labeling service error: {0}")]
    Api(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no valid mapping found in the service response")]
    NoValidMapping,
    #[error("labeling task failed: {0}")]
    TaskFailed(String),
    #[error("labeling task did not complete before the deadline")]
    TimedOut,
    #[error("escalation cancelled")]
    Cancelled,
}

impl LabelingError {
    /// Whether another submit attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LabelingError::TimedOut | LabelingError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("labeling service not configured. Set TASKCANON_LABELING_API_KEY")]
    NotConfigured,
    #[error("invalid labeling configuration: {0}")]
    Invalid(String),
}
