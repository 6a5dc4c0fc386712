// SPDX-License-Identifier: MIT OR Apache-2.0
//! The step handler trait and failure signals.

use crate::context::StepContext;
use crate::contract::InputContract;
use async_trait::async_trait;
use bilko_core::error::WorkflowError;
use bilko_core::plan::CompiledStep;
use std::collections::BTreeMap;

/// Outputs a handler returns on success, keyed by output name.
pub type StepOutputs = BTreeMap<String, serde_json::Value>;

/// How a handler reports failure.
///
/// The runner never relies on unwinding for control flow; handlers return
/// one of these tagged failures instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerFailure {
    /// Do not retry, regardless of remaining attempts.
    NonRetryable {
        /// Failure description.
        message: String,
        /// Upstream status code, when one exists.
        status_code: Option<u16>,
    },

    /// Ordinary failure; the runner may retry under the step's policy.
    Failed {
        /// Failure description.
        message: String,
    },
}

impl HandlerFailure {
    /// A non-retryable failure with no status code.
    #[must_use]
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable {
            message: message.into(),
            status_code: None,
        }
    }

    /// A non-retryable failure carrying an upstream status code.
    #[must_use]
    pub fn non_retryable_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::NonRetryable {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// An ordinary, retryable failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Pluggable executor for one step type.
///
/// Implementations are registered by type tag and invoked by the runner
/// with the compiled step and a per-dispatch [`StepContext`].
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use bilko_core::plan::CompiledStep;
/// use bilko_handlers::{HandlerFailure, StepContext, StepHandler, StepOutputs};
///
/// struct Echo;
///
/// #[async_trait]
/// impl StepHandler for Echo {
///     fn step_type(&self) -> &str {
///         "transform.map"
///     }
///
///     async fn execute(
///         &self,
///         step: &CompiledStep,
///         _ctx: &StepContext,
///     ) -> Result<StepOutputs, HandlerFailure> {
///         Ok(step.inputs.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step type this handler executes (e.g. `"http.get"`).
    fn step_type(&self) -> &str;

    /// The input contract checked during compilation, if any.
    fn input_contract(&self) -> Option<InputContract> {
        None
    }

    /// Optional pre-flight probe (e.g. "is this model reachable?").
    ///
    /// Run by `validate_handlers`, never during compilation itself.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkflowError`] describing why the step cannot run.
    async fn validate(&self, _step: &CompiledStep) -> Result<(), WorkflowError> {
        Ok(())
    }

    /// Execute the step.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerFailure::NonRetryable`] to stop the retry loop
    /// immediately, or [`HandlerFailure::Failed`] for failures the runner
    /// may retry under the step's policy.
    async fn execute(
        &self,
        step: &CompiledStep,
        ctx: &StepContext,
    ) -> Result<StepOutputs, HandlerFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_constructors_tag_correctly() {
        assert_eq!(
            HandlerFailure::non_retryable_status("not found", 404),
            HandlerFailure::NonRetryable {
                message: "not found".into(),
                status_code: Some(404),
            }
        );
        assert_eq!(
            HandlerFailure::failed("flaky"),
            HandlerFailure::Failed {
                message: "flaky".into()
            }
        );
    }
}
