// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-step execution under policy.
//!
//! One call drives one compiled step through its attempt loop: timeout per
//! attempt, backoff between attempts, immediate return on a non-retryable
//! signal, cancellation observed before and between attempts. The runner
//! never unwinds; every outcome is a tagged [`StepRun`].

use crate::backoff::compute_backoff;
use bilko_core::error::{ErrorCode, SuggestedFix, WorkflowError};
use bilko_core::plan::CompiledStep;
use bilko_core::state::StepStatus;
use bilko_handlers::{CancelProbe, HandlerFailure, HandlerRegistry, StepContext, StepOutputs};
use std::time::Duration;
use tracing::{debug, warn};

/// Granularity at which the backoff sleep re-checks cancellation.
const CANCEL_POLL_MS: u64 = 25;

/// Outcome of running one step.
#[derive(Debug, Clone)]
pub struct StepRun {
    /// Terminal status: `Succeeded`, `Failed`, or `Canceled`.
    pub status: StepStatus,

    /// Handler outputs on success.
    pub outputs: StepOutputs,

    /// Captured error on failure.
    pub error: Option<WorkflowError>,

    /// Handler invocations consumed.
    pub attempts: u32,

    /// Wall-clock duration of the final attempt, in milliseconds.
    pub duration_ms: u64,
}

impl StepRun {
    fn failed(error: WorkflowError, attempts: u32, duration_ms: u64) -> Self {
        Self {
            status: StepStatus::Failed,
            outputs: StepOutputs::new(),
            error: Some(error),
            attempts,
            duration_ms,
        }
    }

    fn canceled(attempts: u32) -> Self {
        Self {
            status: StepStatus::Canceled,
            outputs: StepOutputs::new(),
            error: None,
            attempts,
            duration_ms: 0,
        }
    }
}

/// Execute one compiled step under its policy.
///
/// Attempts run `1..=maxAttempts`. Cancellation observed before or between
/// attempts returns `Canceled` with the attempt count reached; a
/// non-retryable signal returns `Failed` without consuming the remaining
/// attempts; a missing handler fails immediately with `STEP.NO_HANDLER`.
pub async fn run_step(
    step: &CompiledStep,
    ctx: &StepContext,
    registry: &HandlerRegistry,
) -> StepRun {
    let Some(handler) = registry.get(&step.step_type) else {
        return StepRun::failed(
            WorkflowError::new(
                ErrorCode::NoHandler,
                format!("no handler registered for step type '{}'", step.step_type),
            )
            .with_step(step.id.clone())
            .with_fix(
                SuggestedFix::new("register-handler")
                    .param("stepType", serde_json::json!(step.step_type)),
            ),
            0,
            0,
        );
    };

    let policy = &step.policy;
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut last_error: Option<WorkflowError> = None;
    let mut last_duration_ms: u64 = 0;

    for attempt in 1..=policy.max_attempts {
        if ctx.cancellation.is_canceled() {
            return StepRun::canceled(attempt - 1);
        }

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(timeout, handler.execute(step, ctx)).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        last_duration_ms = duration_ms;

        match outcome {
            Ok(Ok(outputs)) => {
                debug!(
                    target: "bilko.runner",
                    step = %step.id,
                    attempt,
                    duration_ms,
                    "step succeeded"
                );
                return StepRun {
                    status: StepStatus::Succeeded,
                    outputs,
                    error: None,
                    attempts: attempt,
                    duration_ms,
                };
            }

            Ok(Err(HandlerFailure::NonRetryable { message, status_code })) => {
                let mut error = WorkflowError::new(
                    ErrorCode::NonRetryable,
                    format!("handler refused retry: {message}"),
                )
                .with_step(step.id.clone())
                .masked(&ctx.secrets.values().cloned().collect::<Vec<_>>());
                if let Some(code) = status_code {
                    error = error.with_detail("statusCode", serde_json::json!(code));
                }
                return StepRun::failed(error, attempt, duration_ms);
            }

            Ok(Err(HandlerFailure::Failed { message })) => {
                last_error = Some(
                    WorkflowError::new(
                        ErrorCode::ExecutionError,
                        format!("handler failed: {message}"),
                    )
                    .with_step(step.id.clone())
                    .with_detail("attempt", serde_json::json!(attempt))
                    .masked(&ctx.secrets.values().cloned().collect::<Vec<_>>()),
                );
            }

            Err(_elapsed) => {
                last_error = Some(
                    WorkflowError::new(
                        ErrorCode::StepTimeout,
                        format!(
                            "step '{}' exceeded its {}ms timeout",
                            step.id, policy.timeout_ms
                        ),
                    )
                    .with_step(step.id.clone())
                    .with_detail("timeoutMs", serde_json::json!(policy.timeout_ms))
                    .with_fix(
                        SuggestedFix::new("increase-timeout")
                            .param("timeoutMs", serde_json::json!(policy.timeout_ms * 2)),
                    )
                    .with_fix(
                        SuggestedFix::new("reduce-scope")
                            .describe("split the step into smaller pieces"),
                    ),
                );
            }
        }

        if attempt < policy.max_attempts {
            let delay = compute_backoff(policy.backoff_strategy, policy.backoff_base_ms, attempt);
            warn!(
                target: "bilko.runner",
                step = %step.id,
                attempt,
                delay_ms = delay,
                "attempt failed; backing off"
            );
            if backoff_sleep(Duration::from_millis(delay), &ctx.cancellation).await {
                return StepRun::canceled(attempt);
            }
        }
    }

    let error = last_error.unwrap_or_else(|| {
        WorkflowError::new(ErrorCode::UnknownFailure, "step failed without a captured error")
            .with_step(step.id.clone())
    });
    // Attempts are exhausted; the terminal error is no longer retryable.
    StepRun::failed(error.retryable(false), policy.max_attempts, last_duration_ms)
}

/// Sleep for `duration`, re-checking cancellation every [`CANCEL_POLL_MS`].
///
/// Returns `true` when cancellation was observed during the sleep.
async fn backoff_sleep(duration: Duration, probe: &CancelProbe) -> bool {
    let poll = Duration::from_millis(CANCEL_POLL_MS);
    let mut remaining = duration;
    while !remaining.is_zero() {
        if probe.is_canceled() {
            return true;
        }
        let slice = remaining.min(poll);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    probe.is_canceled()
}
