// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for bilko-flow.
//!
//! If you only take one dependency, take this one.

/// HMAC-signed attestations over provenance records.
pub mod attestation;
/// Typed error taxonomy with machine-actionable fix hints.
pub mod error;
/// Lifecycle events published on the data plane.
pub mod event;
/// Canonical JSON and SHA-256 content addressing.
pub mod hash;
/// Compiled plans and determinism analysis.
pub mod plan;
/// Provenance records: hashes, step images, and the run transcript.
pub mod provenance;
/// Run records and per-step results.
pub mod run;
/// Run and step state machines.
pub mod state;
/// Step-type vocabulary and category predicates.
pub mod vocab;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spec versions this crate understands.
///
/// # Examples
///
/// ```
/// assert!(bilko_core::SUPPORTED_SPEC_VERSIONS.contains(&"1.0"));
/// ```
pub const SUPPORTED_SPEC_VERSIONS: &[&str] = &["1.0"];

/// Current DSL spec version stamped on new documents.
pub const CURRENT_SPEC_VERSION: &str = "1.0";

/// Tenant scope attached to records and lookups.
///
/// Absent scope means library mode: no tenant filtering anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Owning tenant identifier.
    pub tenant_id: String,

    /// Optional project partition within the tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Scope {
    /// Create a scope with only a tenant id.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: None,
        }
    }
}

/// Returns `true` when a record's scope is visible under a lookup filter.
///
/// A `None` filter (library mode) matches everything; a record without a
/// scope is delivered to every subscriber.
#[must_use]
pub fn scope_matches(record: Option<&Scope>, filter: Option<&Scope>) -> bool {
    match (record, filter) {
        (_, None) | (None, _) => true,
        (Some(r), Some(f)) => r == f,
    }
}

/// Lifecycle state of a workflow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Newly created, not yet activated.
    Draft,
    /// Available for run creation.
    Active,
    /// Retired; runs can no longer be created from it.
    Archived,
}

/// Reproducibility grade a workflow targets or achieves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum DeterminismGrade {
    /// No time, no external calls; replays bit-for-bit.
    Pure,
    /// External effects captured as evidence; replays against the record.
    Replayable,
    /// No reproducibility promises.
    BestEffort,
}

/// How evidence is captured for an external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceCapture {
    /// Record the entire response body.
    FullResponse,
    /// Record only a hash of the response.
    ResponseHash,
    /// Record nothing.
    None,
}

/// An external system a workflow or step depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDependency {
    /// Dependency name (e.g. `"api.weather.gov"`).
    pub name: String,

    /// Whether the dependency answers deterministically for equal requests.
    pub deterministic: bool,

    /// Evidence-capture mode for calls to this dependency.
    pub evidence_capture: EvidenceCapture,
}

/// Workflow-level determinism declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDeterminism {
    /// Grade the author intends this workflow to achieve.
    pub target_grade: DeterminismGrade,

    /// Declared time sources (e.g. `"wall-clock"`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_sources: Vec<String>,

    /// Declared external dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_dependencies: Vec<ExternalDependency>,
}

impl WorkflowDeterminism {
    /// Declaration targeting the given grade with nothing else declared.
    #[must_use]
    pub fn target(grade: DeterminismGrade) -> Self {
        Self {
            target_grade: grade,
            time_sources: Vec::new(),
            external_dependencies: Vec::new(),
        }
    }
}

/// Step-level determinism declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepDeterminism {
    /// The step computes outputs purely from its inputs.
    pub pure_function: bool,

    /// The step reads a clock.
    pub uses_time: bool,

    /// Which time source the step reads, when `uses_time` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_source: Option<String>,

    /// The step calls out of process.
    pub uses_external_apis: bool,

    /// External dependencies specific to this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_dependencies: Option<Vec<ExternalDependency>>,
}

impl Default for StepDeterminism {
    fn default() -> Self {
        Self {
            pure_function: true,
            uses_time: false,
            time_source: None,
            uses_external_apis: false,
            external_dependencies: None,
        }
    }
}

/// Strategy for spacing retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Wait the base delay between every attempt.
    Fixed,
    /// Double the base delay for each subsequent attempt.
    #[default]
    Exponential,
}

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default maximum attempts per step.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default backoff base in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Smallest accepted per-attempt timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Largest accepted per-attempt timeout.
pub const MAX_TIMEOUT_MS: u64 = 600_000;
/// Largest accepted attempt count.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Per-step retry, timeout, and backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepPolicy {
    /// Upper bound on a single handler invocation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total invocations allowed, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How retry delays grow.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,

    /// Base retry delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_strategy: BackoffStrategy::Exponential,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }
}

/// A single typed step in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Identifier, unique within the workflow.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Step type from the registered vocabulary (e.g. `"transform.map"`).
    pub step_type: String,

    /// Ids of sibling steps that must succeed before this one runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Opaque inputs, interpreted by the handler for `step_type`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, serde_json::Value>,

    /// Retry, timeout, and backoff policy.
    #[serde(default)]
    pub policy: StepPolicy,

    /// Determinism declaration for this step.
    #[serde(default)]
    pub determinism: StepDeterminism,
}

/// A user-authored workflow document.
///
/// Documents are created as drafts, mutated only through explicit updates
/// that bump `version`, and may be archived. Compiled plans are derived,
/// never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Stable workflow identifier.
    pub id: String,

    /// Monotonically increasing document version.
    pub version: u64,

    /// DSL spec version this document was authored against.
    pub spec_version: String,

    /// Human-readable name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Workflow-level determinism declaration.
    pub determinism: WorkflowDeterminism,

    /// Id of the step execution begins from.
    pub entry_step_id: String,

    /// Ordered, non-empty collection of steps.
    pub steps: Vec<Step>,

    /// Names of secrets that must be supplied before a run is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_secrets: Vec<String>,

    /// Lifecycle state.
    pub status: WorkflowStatus,

    /// Tenant scope, absent in library mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Builder for [`Workflow`] documents.
///
/// # Examples
///
/// ```
/// use bilko_core::{DeterminismGrade, StepBuilder, WorkflowBuilder};
///
/// let wf = WorkflowBuilder::new("wf-greet", "Greet")
///     .target_grade(DeterminismGrade::BestEffort)
///     .step(StepBuilder::new("s1", "transform.map").build())
///     .build();
///
/// assert_eq!(wf.entry_step_id, "s1");
/// assert_eq!(wf.version, 1);
/// ```
#[derive(Debug)]
pub struct WorkflowBuilder {
    id: String,
    name: String,
    description: Option<String>,
    determinism: WorkflowDeterminism,
    entry_step_id: Option<String>,
    steps: Vec<Step>,
    required_secrets: Vec<String>,
    scope: Option<Scope>,
}

impl WorkflowBuilder {
    /// Create a builder for a new draft document.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            determinism: WorkflowDeterminism::target(DeterminismGrade::BestEffort),
            entry_step_id: None,
            steps: Vec::new(),
            required_secrets: Vec::new(),
            scope: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Set the target determinism grade.
    #[must_use]
    pub fn target_grade(mut self, grade: DeterminismGrade) -> Self {
        self.determinism.target_grade = grade;
        self
    }

    /// Replace the full determinism declaration.
    #[must_use]
    pub fn determinism(mut self, determinism: WorkflowDeterminism) -> Self {
        self.determinism = determinism;
        self
    }

    /// Set the entry step id explicitly.
    ///
    /// When not set, the first appended step becomes the entry.
    #[must_use]
    pub fn entry_step(mut self, id: impl Into<String>) -> Self {
        self.entry_step_id = Some(id.into());
        self
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Require a named secret.
    #[must_use]
    pub fn require_secret(mut self, name: impl Into<String>) -> Self {
        self.required_secrets.push(name.into());
        self
    }

    /// Attach a tenant scope.
    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Consume the builder and produce a draft [`Workflow`] at version 1.
    #[must_use]
    pub fn build(self) -> Workflow {
        let now = Utc::now();
        let entry = self
            .entry_step_id
            .or_else(|| self.steps.first().map(|s| s.id.clone()))
            .unwrap_or_default();
        Workflow {
            id: self.id,
            version: 1,
            spec_version: CURRENT_SPEC_VERSION.to_string(),
            name: self.name,
            description: self.description,
            determinism: self.determinism,
            entry_step_id: entry,
            steps: self.steps,
            required_secrets: self.required_secrets,
            status: WorkflowStatus::Draft,
            scope: self.scope,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Builder for [`Step`]s.
///
/// # Examples
///
/// ```
/// use bilko_core::StepBuilder;
///
/// let step = StepBuilder::new("fetch", "http.get")
///     .depends_on("prepare")
///     .input("url", serde_json::json!("https://example.com"))
///     .timeout_ms(5_000)
///     .external_api()
///     .build();
///
/// assert_eq!(step.policy.timeout_ms, 5_000);
/// assert!(step.determinism.uses_external_apis);
/// ```
#[derive(Debug)]
pub struct StepBuilder {
    id: String,
    name: Option<String>,
    step_type: String,
    depends_on: Vec<String>,
    inputs: BTreeMap<String, serde_json::Value>,
    policy: StepPolicy,
    determinism: StepDeterminism,
}

impl StepBuilder {
    /// Create a builder for a step of the given type.
    #[must_use]
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            step_type: step_type.into(),
            depends_on: Vec::new(),
            inputs: BTreeMap::new(),
            policy: StepPolicy::default(),
            determinism: StepDeterminism::default(),
        }
    }

    /// Set the human-readable name. Defaults to the id.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a dependency on a sibling step.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Set one input value.
    #[must_use]
    pub fn input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.policy.timeout_ms = ms;
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.max_attempts = n;
        self
    }

    /// Set the backoff strategy and base delay.
    #[must_use]
    pub fn backoff(mut self, strategy: BackoffStrategy, base_ms: u64) -> Self {
        self.policy.backoff_strategy = strategy;
        self.policy.backoff_base_ms = base_ms;
        self
    }

    /// Replace the full policy.
    #[must_use]
    pub fn policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Declare that the step calls external APIs.
    #[must_use]
    pub fn external_api(mut self) -> Self {
        self.determinism.uses_external_apis = true;
        self.determinism.pure_function = false;
        self
    }

    /// Declare that the step reads the given time source.
    #[must_use]
    pub fn uses_time(mut self, source: impl Into<String>) -> Self {
        self.determinism.uses_time = true;
        self.determinism.time_source = Some(source.into());
        self.determinism.pure_function = false;
        self
    }

    /// Declare an external dependency on this step.
    #[must_use]
    pub fn external_dependency(mut self, dep: ExternalDependency) -> Self {
        self.determinism
            .external_dependencies
            .get_or_insert_with(Vec::new)
            .push(dep);
        self
    }

    /// Replace the full determinism declaration.
    #[must_use]
    pub fn determinism(mut self, determinism: StepDeterminism) -> Self {
        self.determinism = determinism;
        self
    }

    /// Consume the builder and produce a [`Step`].
    #[must_use]
    pub fn build(self) -> Step {
        Step {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            step_type: self.step_type,
            depends_on: self.depends_on,
            inputs: self.inputs,
            policy: self.policy,
            determinism: self.determinism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_entry_to_first_step() {
        let wf = WorkflowBuilder::new("wf", "test")
            .step(StepBuilder::new("a", "transform.map").build())
            .step(StepBuilder::new("b", "transform.map").depends_on("a").build())
            .build();
        assert_eq!(wf.entry_step_id, "a");
        assert_eq!(wf.status, WorkflowStatus::Draft);
        assert_eq!(wf.spec_version, CURRENT_SPEC_VERSION);
    }

    #[test]
    fn step_builder_applies_policy() {
        let step = StepBuilder::new("s", "transform.map")
            .max_attempts(5)
            .backoff(BackoffStrategy::Fixed, 250)
            .build();
        assert_eq!(step.policy.max_attempts, 5);
        assert_eq!(step.policy.backoff_strategy, BackoffStrategy::Fixed);
        assert_eq!(step.policy.backoff_base_ms, 250);
    }

    #[test]
    fn workflow_wire_form_is_camel_case() {
        let wf = WorkflowBuilder::new("wf", "test")
            .step(StepBuilder::new("a", "transform.map").build())
            .build();
        let json = serde_json::to_value(&wf).unwrap();
        assert!(json.get("specVersion").is_some());
        assert!(json.get("entryStepId").is_some());
        let step = &json["steps"][0];
        assert!(step.get("stepType").is_some());
        assert_eq!(step["policy"]["timeoutMs"], 30_000);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: StepPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, StepPolicy::default());
        assert_eq!(policy.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(policy.backoff_base_ms, 1_000);
    }

    #[test]
    fn scope_matching_rules() {
        let a = Scope::new("t1");
        let b = Scope::new("t2");
        assert!(scope_matches(Some(&a), None));
        assert!(scope_matches(None, Some(&a)));
        assert!(scope_matches(Some(&a), Some(&a)));
        assert!(!scope_matches(Some(&a), Some(&b)));
    }

    #[test]
    fn determinism_grades_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&DeterminismGrade::BestEffort).unwrap(),
            "\"best-effort\""
        );
        assert_eq!(serde_json::to_string(&DeterminismGrade::Pure).unwrap(), "\"pure\"");
        assert_eq!(
            serde_json::to_string(&EvidenceCapture::ResponseHash).unwrap(),
            "\"response-hash\""
        );
    }
}
