//! Progress and guardrail executor for stepwise tool handlers
//!
//! The executor pulls steps from a [`StepSource`] until it reports
//! [`Step::Done`], turning `{"type": "progress"}` yields into numbered
//! progress notifications. Step count and elapsed time are checked after
//! every yield, and every pull is bounded by the remaining time budget.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::handler::{Content, HandlerError, Step, StepSource};

pub const DEFAULT_MAX_STEPS: u64 = 10_000;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardrailLimits {
    pub max_steps: u64,
    pub max_duration: Duration,
}

impl Default for GuardrailLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub progress: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Guardrail exceeded: step limit of {max_steps} steps reached")]
    StepLimit { max_steps: u64 },
    #[error("Guardrail exceeded: execution time limit of {max_ms} ms reached")]
    TimeLimit { max_ms: u128 },
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: Result<Content, ExecutionError>,
    pub notifications: Vec<ProgressNotification>,
    pub steps: u64,
}

pub struct ProgressExecutor {
    limits: GuardrailLimits,
    total: Option<u64>,
    progress_token: Option<Value>,
}

fn is_progress_event(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("progress")
}

impl ProgressExecutor {
    pub fn new(limits: GuardrailLimits) -> Self {
        Self {
            limits,
            total: None,
            progress_token: None,
        }
    }

    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.total = total;
        self
    }

    /// Progress is only buffered when the caller asked for it with a token.
    pub fn with_progress_token(mut self, token: Option<Value>) -> Self {
        self.progress_token = token;
        self
    }

    pub async fn run(&self, mut source: Box<dyn StepSource>) -> ExecutionOutcome {
        let started_at = Instant::now();
        let mut notifications = Vec::new();
        let mut steps = 0_u64;
        let mut progress = 0_u64;

        let result = loop {
            let remaining = self
                .limits
                .max_duration
                .saturating_sub(started_at.elapsed());

            let step = match timeout(remaining, source.next_step()).await {
                Ok(Ok(step)) => step,
                Ok(Err(err)) => break Err(ExecutionError::Handler(err)),
                Err(_) => break Err(self.time_limit()),
            };

            match step {
                Step::Done(content) => break Ok(content),
                Step::Yield(value) => {
                    steps += 1;
                    if is_progress_event(&value) {
                        progress += 1;
                        if self.progress_token.is_some() {
                            notifications.push(self.notification(progress, &value));
                        }
                    }
                }
            }

            if steps > self.limits.max_steps {
                break Err(ExecutionError::StepLimit {
                    max_steps: self.limits.max_steps,
                });
            }
            if started_at.elapsed() > self.limits.max_duration {
                break Err(self.time_limit());
            }
        };

        debug!(
            steps,
            progress_events = progress,
            buffered = notifications.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            succeeded = result.is_ok(),
            "stepwise handler finished"
        );

        ExecutionOutcome {
            result,
            notifications,
            steps,
        }
    }

    fn notification(&self, progress: u64, event: &Value) -> ProgressNotification {
        ProgressNotification {
            kind: "progress",
            progress,
            total: self.total,
            message: event
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            progress_token: self.progress_token.clone(),
        }
    }

    fn time_limit(&self) -> ExecutionError {
        ExecutionError::TimeLimit {
            max_ms: self.limits.max_duration.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct Countdown {
        remaining: u64,
        pause: Option<Duration>,
    }

    impl Countdown {
        fn boxed(steps: u64) -> Box<dyn StepSource> {
            Box::new(Self {
                remaining: steps,
                pause: None,
            })
        }

        fn slow(steps: u64, pause: Duration) -> Box<dyn StepSource> {
            Box::new(Self {
                remaining: steps,
                pause: Some(pause),
            })
        }
    }

    #[async_trait]
    impl StepSource for Countdown {
        async fn next_step(&mut self) -> Result<Step, HandlerError> {
            if let Some(pause) = self.pause {
                tokio::time::sleep(pause).await;
            }
            if self.remaining == 0 {
                return Ok(Step::done("finished"));
            }
            self.remaining -= 1;
            Ok(Step::progress())
        }
    }

    struct Scripted(Vec<Result<Step, HandlerError>>);

    #[async_trait]
    impl StepSource for Scripted {
        async fn next_step(&mut self) -> Result<Step, HandlerError> {
            if self.0.is_empty() {
                return Ok(Step::done("exhausted"));
            }
            self.0.remove(0)
        }
    }

    #[tokio::test]
    async fn completion_value_becomes_the_result() {
        let executor = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = executor
            .run(Box::new(Scripted(vec![
                Ok(Step::Yield(json!("intermediate"))),
                Ok(Step::done(json!({"answer": 42}))),
            ])))
            .await;

        assert_eq!(outcome.result, Ok(Content::Json(json!({"answer": 42}))));
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn progress_is_numbered_and_only_buffered_with_a_token() {
        let with_token = ProgressExecutor::new(GuardrailLimits::default())
            .with_total(Some(3))
            .with_progress_token(Some(json!("tok-1")));
        let outcome = with_token
            .run(Box::new(Scripted(vec![
                Ok(Step::progress()),
                Ok(Step::Yield(json!({"type": "log", "line": "ignored"}))),
                Ok(Step::progress_message("halfway")),
                Ok(Step::progress()),
                Ok(Step::done("ok")),
            ])))
            .await;

        let numbers: Vec<u64> = outcome.notifications.iter().map(|n| n.progress).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(outcome.notifications.iter().all(|n| n.total == Some(3)));
        assert_eq!(outcome.notifications[1].message.as_deref(), Some("halfway"));
        assert_eq!(
            serde_json::to_value(&outcome.notifications[0]).expect("serializable"),
            json!({"type": "progress", "progress": 1, "total": 3, "progressToken": "tok-1"})
        );

        let without_token = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = without_token.run(Countdown::boxed(5)).await;
        assert!(outcome.notifications.is_empty());
        assert_eq!(outcome.result, Ok(Content::Text("finished".to_string())));
    }

    #[tokio::test]
    async fn exactly_max_steps_succeeds() {
        let executor = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = executor.run(Countdown::boxed(DEFAULT_MAX_STEPS)).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.steps, DEFAULT_MAX_STEPS);
    }

    #[tokio::test]
    async fn one_step_past_the_limit_fails() {
        let executor = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = executor.run(Countdown::boxed(DEFAULT_MAX_STEPS + 1)).await;
        assert_eq!(
            outcome.result,
            Err(ExecutionError::StepLimit {
                max_steps: DEFAULT_MAX_STEPS
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_yields_hit_the_time_limit_regardless_of_step_count() {
        let executor = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = executor
            .run(Countdown::slow(100, Duration::from_secs(1)))
            .await;
        assert!(matches!(
            outcome.result,
            Err(ExecutionError::TimeLimit { max_ms: 60_000 })
        ));
        assert!(outcome.steps < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn a_single_stalled_step_is_cut_off_at_the_deadline() {
        let executor = ProgressExecutor::new(GuardrailLimits {
            max_steps: DEFAULT_MAX_STEPS,
            max_duration: Duration::from_millis(500),
        });
        let outcome = executor
            .run(Countdown::slow(1, Duration::from_secs(3600)))
            .await;
        assert!(matches!(
            outcome.result,
            Err(ExecutionError::TimeLimit { max_ms: 500 })
        ));
        assert_eq!(outcome.steps, 0);
    }

    #[tokio::test]
    async fn handler_errors_fail_the_run() {
        let executor = ProgressExecutor::new(GuardrailLimits::default());
        let outcome = executor
            .run(Box::new(Scripted(vec![
                Ok(Step::progress()),
                Err(HandlerError::new("disk on fire")),
            ])))
            .await;
        assert_eq!(
            outcome.result,
            Err(ExecutionError::Handler(HandlerError::new("disk on fire")))
        );
        assert_eq!(outcome.result.unwrap_err().to_string(), "disk on fire");
    }
}
