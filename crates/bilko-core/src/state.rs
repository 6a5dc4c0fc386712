// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run and step state machines.
//!
//! Legal transitions are closed tables; everything not in a table produces a
//! typed invalid-transition error carrying `{current, target, validTargets}`
//! so callers can enumerate what would have been allowed.

use crate::error::{ErrorCode, WorkflowError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Record exists, not yet queued.
    Created,
    /// Accepted for execution.
    Queued,
    /// Steps are being dispatched.
    Running,
    /// Every step succeeded.
    Succeeded,
    /// A step failed terminally.
    Failed,
    /// Cancellation was observed.
    Canceled,
}

impl RunStatus {
    /// Legal targets from this state. Terminal states return an empty slice.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [RunStatus] {
        match self {
            Self::Created => &[Self::Queued, Self::Canceled],
            Self::Queued => &[Self::Running, Self::Canceled],
            Self::Running => &[Self::Succeeded, Self::Failed, Self::Canceled],
            Self::Succeeded | Self::Failed | Self::Canceled => &[],
        }
    }

    /// Returns `true` when no outgoing transition exists.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Returns `true` when `target` is reachable in one legal move.
    #[must_use]
    pub fn can_transition(&self, target: RunStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Check a transition, producing `RUN.INVALID_TRANSITION` when illegal.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkflowError`] with the current state, the rejected
    /// target, and the set of valid targets in `details`.
    pub fn transition(&self, target: RunStatus) -> Result<RunStatus, WorkflowError> {
        if self.can_transition(target) {
            return Ok(target);
        }
        Err(invalid_transition_error(
            ErrorCode::RunInvalidTransition,
            &format!("run cannot move from {self:?} to {target:?}"),
            serde_json::to_value(self),
            serde_json::to_value(target),
            serde_json::to_value(self.valid_transitions()),
        ))
    }
}

/// Lifecycle state of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting on dependencies or dispatch.
    Pending,
    /// The handler is being invoked.
    Running,
    /// The handler returned outputs.
    Succeeded,
    /// The handler failed terminally.
    Failed,
    /// The step was never dispatched or was interrupted by cancellation.
    Canceled,
}

impl StepStatus {
    /// Legal targets from this state. Terminal states return an empty slice.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [StepStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Canceled],
            Self::Running => &[Self::Succeeded, Self::Failed, Self::Canceled],
            Self::Succeeded | Self::Failed | Self::Canceled => &[],
        }
    }

    /// Returns `true` when no outgoing transition exists.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Returns `true` when `target` is reachable in one legal move.
    #[must_use]
    pub fn can_transition(&self, target: StepStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Check a transition, producing `STEP.INVALID_TRANSITION` when illegal.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkflowError`] with the current state, the rejected
    /// target, and the set of valid targets in `details`.
    pub fn transition(&self, target: StepStatus) -> Result<StepStatus, WorkflowError> {
        if self.can_transition(target) {
            return Ok(target);
        }
        Err(invalid_transition_error(
            ErrorCode::StepInvalidTransition,
            &format!("step cannot move from {self:?} to {target:?}"),
            serde_json::to_value(self),
            serde_json::to_value(target),
            serde_json::to_value(self.valid_transitions()),
        ))
    }
}

fn invalid_transition_error(
    code: ErrorCode,
    message: &str,
    current: Result<serde_json::Value, serde_json::Error>,
    target: Result<serde_json::Value, serde_json::Error>,
    valid: Result<serde_json::Value, serde_json::Error>,
) -> WorkflowError {
    WorkflowError::new(code, message)
        .with_detail("current", current.unwrap_or(serde_json::Value::Null))
        .with_detail("target", target.unwrap_or(serde_json::Value::Null))
        .with_detail("validTargets", valid.unwrap_or(serde_json::Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_STATES: [RunStatus; 6] = [
        RunStatus::Created,
        RunStatus::Queued,
        RunStatus::Running,
        RunStatus::Succeeded,
        RunStatus::Failed,
        RunStatus::Canceled,
    ];

    const STEP_STATES: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::Succeeded,
        StepStatus::Failed,
        StepStatus::Canceled,
    ];

    #[test]
    fn happy_path_is_legal() {
        assert!(RunStatus::Created.can_transition(RunStatus::Queued));
        assert!(RunStatus::Queued.can_transition(RunStatus::Running));
        assert!(RunStatus::Running.can_transition(RunStatus::Succeeded));
        assert!(StepStatus::Pending.can_transition(StepStatus::Running));
        assert!(StepStatus::Running.can_transition(StepStatus::Succeeded));
    }

    #[test]
    fn cancellation_is_reachable_from_every_non_terminal_run_state() {
        for state in RUN_STATES.iter().filter(|s| !s.is_terminal()) {
            assert!(
                state.can_transition(RunStatus::Canceled),
                "{state:?} cannot cancel"
            );
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for state in [RunStatus::Succeeded, RunStatus::Failed, RunStatus::Canceled] {
            assert!(state.is_terminal());
            for target in RUN_STATES {
                assert!(state.transition(target).is_err());
            }
        }
        for state in [StepStatus::Succeeded, StepStatus::Failed, StepStatus::Canceled] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn every_illegal_run_pair_produces_typed_error() {
        for current in RUN_STATES {
            for target in RUN_STATES {
                let legal = current.valid_transitions().contains(&target);
                match current.transition(target) {
                    Ok(next) => {
                        assert!(legal);
                        assert_eq!(next, target);
                    }
                    Err(err) => {
                        assert!(!legal);
                        assert_eq!(err.code, ErrorCode::RunInvalidTransition);
                        assert!(err.details.contains_key("validTargets"));
                    }
                }
            }
        }
    }

    #[test]
    fn every_illegal_step_pair_produces_typed_error() {
        for current in STEP_STATES {
            for target in STEP_STATES {
                let legal = current.valid_transitions().contains(&target);
                match current.transition(target) {
                    Ok(_) => assert!(legal),
                    Err(err) => {
                        assert!(!legal);
                        assert_eq!(err.code, ErrorCode::StepInvalidTransition);
                    }
                }
            }
        }
    }

    #[test]
    fn error_details_carry_serialized_states() {
        let err = RunStatus::Succeeded.transition(RunStatus::Running).unwrap_err();
        assert_eq!(err.details["current"], serde_json::json!("succeeded"));
        assert_eq!(err.details["target"], serde_json::json!("running"));
        assert_eq!(err.details["validTargets"], serde_json::json!([]));
    }
}
