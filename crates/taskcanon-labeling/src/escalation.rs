//! Submit/poll state machine for one escalation request.
//!
//! Each attempt submits the prompt and polls the task until it is completed or
//! failed. Failed attempts are retried after a backoff, up to
//! `max_attempts`. One deadline covers all attempts. Cancellation and the
//! deadline are checked around every await, so neither a sleep nor a hung
//! request can hold the pipeline past them.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::extract::{extract_mapping, LabelMapping};
use crate::service::{LabelingService, TaskId, TaskStatus};
use crate::LabelingError;

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the attempt following the `failures`-th failure.
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Deadline for the whole escalation, all attempts included. `None`
    /// waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Caller side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Escalator side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EscalationState {
    Submitted { task: TaskId, attempt: u32 },
    Polling { task: TaskId, attempt: u32, polls: u32 },
    Completed { task: TaskId },
    Failed { attempt: u32, reason: String },
    TimedOut,
    Cancelled,
}

/// Result of [`Escalator::run`] together with the states it went through.
#[derive(Debug)]
pub struct EscalationOutcome {
    pub result: Result<LabelMapping, LabelingError>,
    pub attempts: u32,
    pub history: Vec<EscalationState>,
}

impl EscalationOutcome {
    pub fn into_result(self) -> Result<LabelMapping, LabelingError> {
        self.result
    }

    pub fn final_state(&self) -> Option<&EscalationState> {
        self.history.last()
    }
}

pub struct Escalator<S> {
    service: S,
    policy: EscalationPolicy,
}

impl<S: LabelingService> Escalator<S> {
    pub fn new(service: S, policy: EscalationPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submit `prompt` and wait for a label mapping, retrying failed attempts.
    pub async fn run(&self, prompt: &str, cancel: &CancelSignal) -> EscalationOutcome {
        let deadline = self.policy.timeout.map(|t| Instant::now() + t);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut history = Vec::new();
        let mut attempts = 0;
        let mut last_error = LabelingError::TaskFailed("no attempt was made".to_string());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.backoff.delay(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                if let Err(err) = guard(cancel, deadline, tokio::time::sleep(delay)).await {
                    history.push(terminal_state(&err));
                    return EscalationOutcome {
                        result: Err(err),
                        attempts,
                        history,
                    };
                }
            }

            attempts = attempt;
            match self.attempt(prompt, attempt, cancel, deadline, &mut history).await {
                Ok(mapping) => {
                    return EscalationOutcome {
                        result: Ok(mapping),
                        attempts,
                        history,
                    };
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(attempt, max_attempts, error = %err, "escalation attempt failed");
                    history.push(EscalationState::Failed {
                        attempt,
                        reason: err.to_string(),
                    });
                    last_error = err;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "escalation stopped");
                    history.push(terminal_state(&err));
                    return EscalationOutcome {
                        result: Err(err),
                        attempts,
                        history,
                    };
                }
            }
        }

        EscalationOutcome {
            result: Err(last_error),
            attempts,
            history,
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        attempt: u32,
        cancel: &CancelSignal,
        deadline: Option<Instant>,
        history: &mut Vec<EscalationState>,
    ) -> Result<LabelMapping, LabelingError> {
        let task = guard(cancel, deadline, self.service.submit(prompt)).await??;
        tracing::debug!(task = %task, attempt, "labeling task submitted");
        history.push(EscalationState::Submitted {
            task: task.clone(),
            attempt,
        });

        let mut polls = 0u32;
        loop {
            guard(cancel, deadline, tokio::time::sleep(self.policy.poll_interval)).await?;
            let snapshot = guard(cancel, deadline, self.service.poll(&task)).await??;
            polls += 1;

            match snapshot.status {
                TaskStatus::Queued | TaskStatus::Processing => {
                    tracing::trace!(task = %task, polls, status = ?snapshot.status, "still waiting");
                    match history.last_mut() {
                        Some(EscalationState::Polling { polls: seen, .. }) => *seen = polls,
                        _ => history.push(EscalationState::Polling {
                            task: task.clone(),
                            attempt,
                            polls,
                        }),
                    }
                }
                TaskStatus::Completed => {
                    let text = snapshot.text.ok_or_else(|| {
                        LabelingError::InvalidResponse("completed task carries no text".to_string())
                    })?;
                    let mapping = extract_mapping(&text)?;
                    tracing::debug!(task = %task, entries = mapping.len(), "labeling task completed");
                    history.push(EscalationState::Completed { task });
                    return Ok(mapping);
                }
                TaskStatus::Failed => {
                    return Err(LabelingError::TaskFailed(
                        snapshot.error.unwrap_or_else(|| "no reason given".to_string()),
                    ));
                }
            }
        }
    }
}

fn terminal_state(err: &LabelingError) -> EscalationState {
    match err {
        LabelingError::Cancelled => EscalationState::Cancelled,
        _ => EscalationState::TimedOut,
    }
}

/// Run `fut` unless cancellation or the deadline comes first.
async fn guard<F: Future>(
    cancel: &CancelSignal,
    deadline: Option<Instant>,
    fut: F,
) -> Result<F::Output, LabelingError> {
    let expiry = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LabelingError::Cancelled),
        _ = expiry => Err(LabelingError::TimedOut),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::TaskSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of poll results; the last one repeats.
    struct Scripted {
        submits: AtomicU32,
        polls: AtomicU32,
        script: Mutex<Vec<TaskSnapshot>>,
    }

    impl Scripted {
        fn new(script: Vec<TaskSnapshot>) -> Self {
            Self {
                submits: AtomicU32::new(0),
                polls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl LabelingService for Scripted {
        async fn submit(&self, _prompt: &str) -> Result<TaskId, LabelingError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(TaskId(format!("task-{n}")))
        }

        async fn poll(&self, _task: &TaskId) -> Result<TaskSnapshot, LabelingError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }
    }

    fn policy(timeout_secs: Option<u64>) -> EscalationPolicy {
        EscalationPolicy {
            poll_interval: Duration::from_secs(2),
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let b = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
        };
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(2));
        assert_eq!(b.delay(3), Duration::from_secs(4));
        assert_eq!(b.delay(4), Duration::from_secs(5));
        assert_eq!(Backoff::Fixed(Duration::from_secs(5)).delay(7), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_processing_polls() {
        let service = Scripted::new(vec![
            TaskSnapshot::pending(TaskStatus::Queued),
            TaskSnapshot::pending(TaskStatus::Processing),
            TaskSnapshot::completed(r#"Resultado: {"troca": "trocar", "trocar": "trocar"}"#),
        ]);
        let escalator = Escalator::new(service, policy(Some(60)));
        let outcome = escalator.run("prompt", &CancelSignal::never()).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(escalator.service().polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            outcome.history,
            vec![
                EscalationState::Submitted { task: TaskId("task-0".into()), attempt: 1 },
                EscalationState::Polling { task: TaskId("task-0".into()), attempt: 1, polls: 2 },
                EscalationState::Completed { task: TaskId("task-0".into()) },
            ]
        );
        let mapping = outcome.into_result().unwrap();
        assert_eq!(mapping["troca"], "trocar");
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_task_times_out() {
        let service = Scripted::new(vec![TaskSnapshot::pending(TaskStatus::Processing)]);
        let escalator = Escalator::new(service, policy(Some(30)));
        let started = Instant::now();
        let outcome = escalator.run("prompt", &CancelSignal::never()).await;

        assert!(matches!(outcome.result, Err(LabelingError::TimedOut)));
        assert_eq!(outcome.final_state(), Some(&EscalationState::TimedOut));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(escalator.service().submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tasks_are_retried_up_to_the_limit() {
        let service = Scripted::new(vec![TaskSnapshot::failed("quota")]);
        let escalator = Escalator::new(service, policy(None));
        let outcome = escalator.run("prompt", &CancelSignal::never()).await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(escalator.service().submits.load(Ordering::SeqCst), 3);
        assert!(matches!(outcome.result, Err(LabelingError::TaskFailed(ref r)) if r == "quota"));
        let failures = outcome
            .history
            .iter()
            .filter(|s| matches!(s, EscalationState::Failed { .. }))
            .count();
        assert_eq!(failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_answer_is_retried_then_succeeds() {
        let service = Scripted::new(vec![
            TaskSnapshot::completed("não consegui gerar o dicionário"),
            TaskSnapshot::completed(r#"{"limpar": "limpar"}"#),
        ]);
        let escalator = Escalator::new(service, policy(Some(120)));
        let outcome = escalator.run("prompt", &CancelSignal::never()).await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(
            outcome.history[1],
            EscalationState::Failed { attempt: 1, .. }
        ));
        assert_eq!(outcome.into_result().unwrap()["limpar"], "limpar");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_polling() {
        let service = Scripted::new(vec![TaskSnapshot::pending(TaskStatus::Processing)]);
        let escalator = Escalator::new(service, policy(None));
        let (handle, signal) = CancelHandle::new();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            handle.cancel();
        });
        let started = Instant::now();
        let outcome = escalator.run("prompt", &signal).await;
        canceller.await.unwrap();

        assert!(matches!(outcome.result, Err(LabelingError::Cancelled)));
        assert_eq!(outcome.final_state(), Some(&EscalationState::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_signal_stops_before_submitting() {
        let service = Scripted::new(vec![TaskSnapshot::completed(r#"{"a": "a"}"#)]);
        let escalator = Escalator::new(service, policy(None));
        let (handle, signal) = CancelHandle::new();
        handle.cancel();

        let outcome = escalator.run("prompt", &signal).await;
        assert!(matches!(outcome.result, Err(LabelingError::Cancelled)));
        assert_eq!(escalator.service().submits.load(Ordering::SeqCst), 0);
    }
}
