//! HTTP client for the hosted labeling service.
//!
//! `POST {base}/tasks` with `{prompt, agentProfile}` returns a task id;
//! `GET {base}/tasks/{id}` returns its status and, once completed, the output.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::escalation::{Backoff, EscalationPolicy};
use crate::extract::response_text;
use crate::service::{LabelingService, TaskId, TaskSnapshot, TaskStatus};
use crate::{ConfigError, LabelingError};
use async_trait::async_trait;

pub const DEFAULT_BASE_URL: &str = "https://api.manus.ai/v1";
pub const DEFAULT_AGENT: &str = "manus-1.5-lite";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct LabelingConfig {
    pub base_url: String,
    pub api_key: String,
    pub agent: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub policy: EscalationPolicy,
}

impl LabelingConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            agent: DEFAULT_AGENT.to_string(),
            request_timeout: Duration::from_secs(60),
            policy: EscalationPolicy::default(),
        }
    }

    /// Load from `TASKCANON_LABELING_*` environment variables.
    ///
    /// `TASKCANON_LABELING_TIMEOUT_SECS=0` disables the overall deadline.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("TASKCANON_LABELING_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::NotConfigured)?;
        let mut config = Self::new(&api_key);

        if let Some(url) = lookup("TASKCANON_LABELING_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(agent) = lookup("TASKCANON_LABELING_AGENT").filter(|a| !a.trim().is_empty()) {
            config.agent = agent.trim().to_string();
        }
        if let Some(secs) = parse_u64(&lookup, "TASKCANON_LABELING_TIMEOUT_SECS")? {
            config.policy.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_u64(&lookup, "TASKCANON_LABELING_POLL_SECS")? {
            config.policy.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = parse_u64(&lookup, "TASKCANON_LABELING_MAX_ATTEMPTS")? {
            config.policy.max_attempts = u32::try_from(n.max(1))
                .map_err(|_| ConfigError::Invalid(format!("max attempts too large: {n}")))?;
        }
        if let Some(secs) = parse_u64(&lookup, "TASKCANON_LABELING_BACKOFF_SECS")? {
            config.policy.backoff = Backoff::Fixed(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer, got `{raw}`"))),
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct HttpLabelingClient {
    client: Client,
    config: LabelingConfig,
}

impl HttpLabelingClient {
    pub fn new(config: LabelingConfig) -> Result<Self, LabelingError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LabelingError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LabelingConfig {
        &self.config
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.config.base_url)
    }
}

#[async_trait]
impl LabelingService for HttpLabelingClient {
    async fn submit(&self, prompt: &str) -> Result<TaskId, LabelingError> {
        let body = serde_json::json!({
            "prompt": prompt,
            "agentProfile": self.config.agent,
        });

        let response = self
            .client
            .post(self.tasks_url())
            .header("accept", "application/json")
            .header("API_KEY", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LabelingError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LabelingError::Api(format!("submit returned {status}: {error_text}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LabelingError::InvalidResponse(e.to_string()))?;
        task_id_from_json(&data)
    }

    async fn poll(&self, task: &TaskId) -> Result<TaskSnapshot, LabelingError> {
        let response = self
            .client
            .get(format!("{}/{}", self.tasks_url(), task))
            .header("accept", "application/json")
            .header("API_KEY", &self.config.api_key)
            .send()
            .await
            .map_err(|e| LabelingError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LabelingError::Api(format!("poll returned {status}: {error_text}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LabelingError::InvalidResponse(e.to_string()))?;
        snapshot_from_json(&data)
    }
}

pub(crate) fn task_id_from_json(data: &Value) -> Result<TaskId, LabelingError> {
    ["task_id", "taskId", "id"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(|id| TaskId(id.to_string()))
        .ok_or_else(|| LabelingError::InvalidResponse(format!("no task id in {data}")))
}

/// Interpret one status payload.
pub fn snapshot_from_json(data: &Value) -> Result<TaskSnapshot, LabelingError> {
    let raw = data
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| LabelingError::InvalidResponse("status payload without `status`".to_string()))?;
    let status = TaskStatus::parse(raw)
        .ok_or_else(|| LabelingError::InvalidResponse(format!("unknown task status `{raw}`")))?;

    Ok(match status {
        TaskStatus::Completed => TaskSnapshot {
            status,
            text: response_text(data),
            error: None,
        },
        TaskStatus::Failed => TaskSnapshot::failed(
            data.get("error")
                .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                .unwrap_or_else(|| raw.to_string()),
        ),
        _ => TaskSnapshot::pending(status),
    })
}
