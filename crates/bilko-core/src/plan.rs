// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiled plans and determinism analysis.
//!
//! A [`CompiledPlan`] is the validated, topologically ordered,
//! content-addressed derivative of a workflow document. Plans are derived on
//! demand and never persisted as authoritative.

use crate::hash::ContentHash;
use crate::{DeterminismGrade, StepDeterminism, StepPolicy};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named determinism rule a workflow or step violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeterminismViolation {
    /// Stable rule key (e.g. `"pure-no-external-api"`).
    pub rule: String,

    /// Offending step, when the rule is step-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Human-readable explanation.
    pub message: String,
}

/// Determinism analysis attached to a compiled plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeterminismAnalysis {
    /// Grade the document targets.
    pub target: DeterminismGrade,

    /// Best grade the step set can actually achieve.
    pub achievable: DeterminismGrade,

    /// `true` when no rule for the target grade is violated.
    pub satisfied: bool,

    /// Rule violations, empty when satisfied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<DeterminismViolation>,
}

/// A step after compilation: defaults applied, implementation pinned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompiledStep {
    /// Step id from the source document.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Step type from the registered vocabulary.
    pub step_type: String,

    /// Pinned implementation version, `"<stepType>@1.0.0"`.
    pub implementation_version: String,

    /// Dependency step ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Handler inputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, serde_json::Value>,

    /// Resolved policy with defaults applied.
    pub policy: StepPolicy,

    /// Determinism summary copied from the source step.
    pub determinism: StepDeterminism,
}

/// The compiler's content-addressed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPlan {
    /// Source workflow id.
    pub workflow_id: String,

    /// Source workflow version.
    pub workflow_version: u64,

    /// Spec version the source document was authored against.
    pub spec_version: String,

    /// Hash of the canonical source workflow document.
    pub workflow_hash: ContentHash,

    /// Hash of the canonical `{executionOrder, steps}` pair.
    pub plan_hash: ContentHash,

    /// Step ids in topological order.
    pub execution_order: Vec<String>,

    /// Compiled steps, in execution order.
    pub steps: Vec<CompiledStep>,

    /// Determinism analysis for the step set.
    pub determinism: DeterminismAnalysis,

    /// Compile timestamp.
    pub compiled_at: DateTime<Utc>,
}

impl CompiledPlan {
    /// Look up a compiled step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&CompiledStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Best determinism grade this plan can achieve.
    #[must_use]
    pub fn achievable_grade(&self) -> DeterminismGrade {
        self.determinism.achievable
    }
}

/// Build the pinned implementation version string for a step type.
#[must_use]
pub fn implementation_version(step_type: &str) -> String {
    format!("{step_type}@1.0.0")
}
