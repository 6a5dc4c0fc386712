// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed error taxonomy for bilko-flow.
//!
//! Errors are values. Every fault surfaced by the compiler, executor, or
//! planner layers is a [`WorkflowError`] carrying a stable namespaced code,
//! a retryability flag, and machine-applicable [`SuggestedFix`] entries so
//! agent-driven repair loops can act without parsing prose.
//!
//! Code namespaces:
//!
//! - **VALIDATION**: schema, graph, or handler-contract failure before execution
//! - **WORKFLOW**: workflow-level compilation and lifecycle faults
//! - **RUN / STEP**: run- and step-level lifecycle and execution faults
//! - **SECRETS / RATE_LIMIT**: environment faults
//! - **PLANNER**: planner-protocol faults

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ErrorCode enum
// ---------------------------------------------------------------------------

/// Enumeration of all bilko-flow error codes, organized by namespace.
///
/// The serialized form is the namespaced code string itself, identical to
/// [`ErrorCode::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    // ── VALIDATION ────────────────────────────────────────────────────
    /// A required top-level field is missing or empty.
    #[serde(rename = "VALIDATION.MISSING_FIELD")]
    MissingField,
    /// The document's spec version is not in the supported set.
    #[serde(rename = "VALIDATION.UNSUPPORTED_SPEC_VERSION")]
    UnsupportedSpecVersion,
    /// The workflow declares no steps.
    #[serde(rename = "VALIDATION.EMPTY_WORKFLOW")]
    EmptyWorkflow,
    /// Two steps share an id.
    #[serde(rename = "VALIDATION.DUPLICATE_STEP_ID")]
    DuplicateStepId,
    /// A step depends on itself.
    #[serde(rename = "VALIDATION.SELF_DEPENDENCY")]
    SelfDependency,
    /// A `dependsOn` entry names no existing step.
    #[serde(rename = "VALIDATION.UNKNOWN_DEPENDENCY")]
    UnknownDependency,
    /// The dependency graph contains a cycle.
    #[serde(rename = "VALIDATION.CYCLE_DETECTED")]
    CycleDetected,
    /// A step is not reachable from the entry step.
    #[serde(rename = "VALIDATION.UNREACHABLE_STEP")]
    UnreachableStep,
    /// The entry step declares dependencies.
    #[serde(rename = "VALIDATION.ENTRY_HAS_DEPENDENCIES")]
    EntryHasDependencies,
    /// `entryStepId` names no existing step.
    #[serde(rename = "VALIDATION.ENTRY_NOT_FOUND")]
    EntryNotFound,
    /// A policy field is outside its accepted range.
    #[serde(rename = "VALIDATION.POLICY_RANGE")]
    PolicyRange,
    /// Step inputs violate the handler's declared input contract.
    #[serde(rename = "VALIDATION.HANDLER_CONTRACT")]
    HandlerContract,
    /// A referenced record does not exist.
    #[serde(rename = "VALIDATION.NOT_FOUND")]
    NotFound,

    // ── WORKFLOW ──────────────────────────────────────────────────────
    /// Compilation failed; see the carried details.
    #[serde(rename = "WORKFLOW.COMPILATION")]
    Compilation,
    /// The workflow violates its declared determinism grade.
    #[serde(rename = "WORKFLOW.DETERMINISM_VIOLATION")]
    DeterminismViolation,
    /// The run is already being executed.
    #[serde(rename = "WORKFLOW.ALREADY_RUNNING")]
    AlreadyRunning,

    // ── RUN ───────────────────────────────────────────────────────────
    /// The requested run state transition is not in the legal table.
    #[serde(rename = "RUN.INVALID_TRANSITION")]
    RunInvalidTransition,
    /// The run id resolves to no record.
    #[serde(rename = "RUN.NOT_FOUND")]
    RunNotFound,
    /// The run was canceled.
    #[serde(rename = "RUN.CANCELED")]
    RunCanceled,
    /// The run exceeded a deadline.
    #[serde(rename = "RUN.TIMEOUT")]
    RunTimeout,

    // ── STEP ──────────────────────────────────────────────────────────
    /// The requested step state transition is not in the legal table.
    #[serde(rename = "STEP.INVALID_TRANSITION")]
    StepInvalidTransition,
    /// The handler exceeded the configured `timeoutMs`.
    #[serde(rename = "STEP.HTTP.TIMEOUT")]
    StepTimeout,
    /// An external API answered with a transient status (429, 5xx).
    #[serde(rename = "STEP.EXTERNAL_API.TRANSIENT")]
    ExternalApiTransient,
    /// An external API answered with a configuration status (400, 401, 403, 404).
    #[serde(rename = "STEP.EXTERNAL_API.CONFIG")]
    ExternalApiConfig,
    /// The handler signalled a non-retryable failure.
    #[serde(rename = "STEP.NON_RETRYABLE")]
    NonRetryable,
    /// The handler failed in an unclassified way.
    #[serde(rename = "STEP.EXECUTION_ERROR")]
    ExecutionError,
    /// No handler is registered for the step type.
    #[serde(rename = "STEP.NO_HANDLER")]
    NoHandler,
    /// The step failed without a captured error.
    #[serde(rename = "STEP.UNKNOWN_FAILURE")]
    UnknownFailure,

    // ── Environment ───────────────────────────────────────────────────
    /// A required secret was not supplied.
    #[serde(rename = "SECRETS.MISSING")]
    SecretsMissing,
    /// A rate limit was exceeded; `details.retryAfterMs` hints the delay.
    #[serde(rename = "RATE_LIMIT.EXCEEDED")]
    RateLimitExceeded,

    // ── PLANNER ───────────────────────────────────────────────────────
    /// The planner's output could not be parsed.
    #[serde(rename = "PLANNER.LLM_PARSE")]
    PlannerLlmParse,
    /// The planner's model provider failed.
    #[serde(rename = "PLANNER.LLM_PROVIDER")]
    PlannerLlmProvider,
    /// The planner does not support the requested spec version.
    #[serde(rename = "PLANNER.VERSION_MISMATCH")]
    PlannerVersionMismatch,
    /// The patch's base version does not match the workflow.
    #[serde(rename = "PLANNER.VERSION_CONFLICT")]
    PlannerVersionConflict,
}

impl ErrorCode {
    /// Stable namespaced code string (e.g. `"VALIDATION.CYCLE_DETECTED"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            // VALIDATION
            Self::MissingField => "VALIDATION.MISSING_FIELD",
            Self::UnsupportedSpecVersion => "VALIDATION.UNSUPPORTED_SPEC_VERSION",
            Self::EmptyWorkflow => "VALIDATION.EMPTY_WORKFLOW",
            Self::DuplicateStepId => "VALIDATION.DUPLICATE_STEP_ID",
            Self::SelfDependency => "VALIDATION.SELF_DEPENDENCY",
            Self::UnknownDependency => "VALIDATION.UNKNOWN_DEPENDENCY",
            Self::CycleDetected => "VALIDATION.CYCLE_DETECTED",
            Self::UnreachableStep => "VALIDATION.UNREACHABLE_STEP",
            Self::EntryHasDependencies => "VALIDATION.ENTRY_HAS_DEPENDENCIES",
            Self::EntryNotFound => "VALIDATION.ENTRY_NOT_FOUND",
            Self::PolicyRange => "VALIDATION.POLICY_RANGE",
            Self::HandlerContract => "VALIDATION.HANDLER_CONTRACT",
            Self::NotFound => "VALIDATION.NOT_FOUND",

            // WORKFLOW
            Self::Compilation => "WORKFLOW.COMPILATION",
            Self::DeterminismViolation => "WORKFLOW.DETERMINISM_VIOLATION",
            Self::AlreadyRunning => "WORKFLOW.ALREADY_RUNNING",

            // RUN
            Self::RunInvalidTransition => "RUN.INVALID_TRANSITION",
            Self::RunNotFound => "RUN.NOT_FOUND",
            Self::RunCanceled => "RUN.CANCELED",
            Self::RunTimeout => "RUN.TIMEOUT",

            // STEP
            Self::StepInvalidTransition => "STEP.INVALID_TRANSITION",
            Self::StepTimeout => "STEP.HTTP.TIMEOUT",
            Self::ExternalApiTransient => "STEP.EXTERNAL_API.TRANSIENT",
            Self::ExternalApiConfig => "STEP.EXTERNAL_API.CONFIG",
            Self::NonRetryable => "STEP.NON_RETRYABLE",
            Self::ExecutionError => "STEP.EXECUTION_ERROR",
            Self::NoHandler => "STEP.NO_HANDLER",
            Self::UnknownFailure => "STEP.UNKNOWN_FAILURE",

            // Environment
            Self::SecretsMissing => "SECRETS.MISSING",
            Self::RateLimitExceeded => "RATE_LIMIT.EXCEEDED",

            // PLANNER
            Self::PlannerLlmParse => "PLANNER.LLM_PARSE",
            Self::PlannerLlmProvider => "PLANNER.LLM_PROVIDER",
            Self::PlannerVersionMismatch => "PLANNER.VERSION_MISMATCH",
            Self::PlannerVersionConflict => "PLANNER.VERSION_CONFLICT",
        }
    }

    /// Default retryability for this code.
    ///
    /// Individual errors may override this (e.g. a transient provider fault
    /// marked terminal after attempts are exhausted).
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::StepTimeout
                | Self::ExternalApiTransient
                | Self::ExecutionError
                | Self::RateLimitExceeded
                | Self::PlannerLlmProvider
        )
    }

    /// All codes, for catalog tests and documentation generation.
    #[must_use]
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::MissingField,
            Self::UnsupportedSpecVersion,
            Self::EmptyWorkflow,
            Self::DuplicateStepId,
            Self::SelfDependency,
            Self::UnknownDependency,
            Self::CycleDetected,
            Self::UnreachableStep,
            Self::EntryHasDependencies,
            Self::EntryNotFound,
            Self::PolicyRange,
            Self::HandlerContract,
            Self::NotFound,
            Self::Compilation,
            Self::DeterminismViolation,
            Self::AlreadyRunning,
            Self::RunInvalidTransition,
            Self::RunNotFound,
            Self::RunCanceled,
            Self::RunTimeout,
            Self::StepInvalidTransition,
            Self::StepTimeout,
            Self::ExternalApiTransient,
            Self::ExternalApiConfig,
            Self::NonRetryable,
            Self::ExecutionError,
            Self::NoHandler,
            Self::UnknownFailure,
            Self::SecretsMissing,
            Self::RateLimitExceeded,
            Self::PlannerLlmParse,
            Self::PlannerLlmProvider,
            Self::PlannerVersionMismatch,
            Self::PlannerVersionConflict,
        ]
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Suggested fixes
// ---------------------------------------------------------------------------

/// A machine-applicable remediation attached to an error.
///
/// `fix_type` is a stable key (e.g. `"remove-step"`, `"set-spec-version"`)
/// and `params` carries whatever that fix needs, so planner repair loops can
/// apply fixes programmatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedFix {
    /// Stable fix key.
    pub fix_type: String,

    /// Fix parameters, keyed per fix type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,

    /// Optional human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SuggestedFix {
    /// Create a fix with no parameters.
    #[must_use]
    pub fn new(fix_type: impl Into<String>) -> Self {
        Self {
            fix_type: fix_type.into(),
            params: BTreeMap::new(),
            description: None,
        }
    }

    /// Attach a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Attach a description.
    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

/// The typed error value carried through results, run records, and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{}] {message}", .code.code())]
pub struct WorkflowError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable message. Secret-masked when built from adapter text.
    pub message: String,

    /// Whether retrying the same operation can succeed.
    pub retryable: bool,

    /// Step this error is attributed to, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Run this error is attributed to, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// Structured context (status codes, transition tables, delay hints).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,

    /// Machine-applicable remediations, most specific first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_fixes: Vec<SuggestedFix>,
}

impl WorkflowError {
    /// Create an error with the code's default retryability.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.retryable(),
            step_id: None,
            run_id: None,
            details: BTreeMap::new(),
            suggested_fixes: Vec::new(),
        }
    }

    /// Attribute the error to a step.
    #[must_use]
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Attribute the error to a run.
    #[must_use]
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attach one detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Attach a suggested fix.
    #[must_use]
    pub fn with_fix(mut self, fix: SuggestedFix) -> Self {
        self.suggested_fixes.push(fix);
        self
    }

    /// Override the retryability flag.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Mask every known secret value in the message and string details.
    ///
    /// Applied to any error whose text may embed adapter or handler output.
    #[must_use]
    pub fn masked(mut self, secrets: &[String]) -> Self {
        self.message = mask_secrets(&self.message, secrets);
        for value in self.details.values_mut() {
            if let serde_json::Value::String(s) = value {
                *s = mask_secrets(s, secrets);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Secret masking
// ---------------------------------------------------------------------------

/// Minimum secret length for partial (last-four) masking.
const PARTIAL_MASK_MIN_LEN: usize = 8;

/// Replace each known secret value in `text`.
///
/// Secrets of eight characters or more keep their last four characters,
/// preceded by asterisks; shorter secrets are fully masked.
///
/// # Examples
///
/// ```
/// let masked = bilko_core::error::mask_secrets(
///     "token sk-12345678 rejected",
///     &["sk-12345678".to_string()],
/// );
/// assert_eq!(masked, "token ****5678 rejected");
/// ```
#[must_use]
pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        if secret.is_empty() {
            continue;
        }
        let replacement = if secret.chars().count() >= PARTIAL_MASK_MIN_LEN {
            let tail: String = secret
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{tail}")
        } else {
            "********".to_string()
        };
        out = out.replace(secret.as_str(), &replacement);
    }
    out
}
