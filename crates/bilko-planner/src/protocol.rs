// SPDX-License-Identifier: MIT OR Apache-2.0
//! The planner contract and its wire types.

use async_trait::async_trait;
use bilko_core::error::WorkflowError;
use bilko_core::{Step, StepDeterminism, StepPolicy, Workflow, WorkflowDeterminism};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a planner implementation declares about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannerVersionInfo {
    /// Planner name.
    pub name: String,

    /// Planner version.
    pub version: String,

    /// DSL spec versions the planner can author.
    pub supported_dsl_versions: Vec<String>,

    /// Step packs the planner knows how to use.
    pub supported_step_packs: Vec<String>,
}

/// A workflow draft proposed for a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProposal {
    /// The proposed document.
    pub workflow: Workflow,

    /// Optional free-text rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A partial update merged into an existing step.
///
/// Absent fields are preserved; the step's `id` is never changed by a
/// merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    /// New human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// New step type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,

    /// Replacement dependency list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,

    /// Replacement inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, serde_json::Value>>,

    /// Replacement policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<StepPolicy>,

    /// Replacement determinism declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determinism: Option<StepDeterminism>,
}

/// A structured patch against a workflow at a pinned base version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    /// Workflow the patch targets.
    pub workflow_id: String,

    /// Version the patch was authored against.
    pub base_version: u64,

    /// Steps to append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_steps: Option<Vec<Step>>,

    /// Step ids to remove.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_step_ids: Option<Vec<String>>,

    /// Partial updates keyed by step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_steps: Option<BTreeMap<String, StepUpdate>>,

    /// Replacement workflow-level determinism declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determinism: Option<WorkflowDeterminism>,

    /// Replacement required-secret list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,
}

/// Everything a planner needs to repair a rejected workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    /// The rejected document.
    pub workflow: Workflow,

    /// Errors the compiler reported.
    pub errors: Vec<WorkflowError>,

    /// Flattened suggested fixes from those errors.
    pub suggested_fixes: Vec<bilko_core::error::SuggestedFix>,
}

/// Planner self-assessed confidence in an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// High confidence.
    High,
    /// Medium confidence.
    Medium,
    /// Low confidence.
    Low,
}

/// A planner's reasoning trace for a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanExplanation {
    /// Ordered reasoning steps.
    pub reasoning_steps: Vec<String>,

    /// Self-assessed confidence.
    pub confidence: Confidence,
}

/// An external component that proposes workflow drafts and patches.
///
/// Planner outputs are untrusted: nothing a planner returns is accepted
/// until it has passed [`validate_proposal`](crate::validate_proposal) or
/// [`validate_patch`](crate::validate_patch).
#[async_trait]
pub trait Planner: Send + Sync {
    /// Declare name, version, and supported DSL versions.
    fn version_info(&self) -> PlannerVersionInfo;

    /// Draft a workflow for a natural-language goal.
    ///
    /// # Errors
    ///
    /// `PLANNER.LLM_PARSE` when the backing model's output could not be
    /// shaped into a proposal; `PLANNER.LLM_PROVIDER` on provider failure.
    async fn propose_workflow(&self, goal: &str) -> Result<WorkflowProposal, WorkflowError>;

    /// Draft a patch that moves `base` toward a goal.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`propose_workflow`](Self::propose_workflow).
    async fn propose_patch(
        &self,
        base: &Workflow,
        goal: &str,
    ) -> Result<WorkflowPatch, WorkflowError>;

    /// Draft a patch that fixes the errors in a repair request.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`propose_workflow`](Self::propose_workflow).
    async fn propose_repair(&self, request: &RepairRequest) -> Result<WorkflowPatch, WorkflowError>;

    /// Explain how the planner would approach a goal.
    ///
    /// Optional; the default declines.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`propose_workflow`](Self::propose_workflow).
    async fn explain_plan(&self, _goal: &str) -> Result<Option<PlanExplanation>, WorkflowError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_wire_form_is_camel_case() {
        let patch = WorkflowPatch {
            workflow_id: "wf".into(),
            base_version: 3,
            remove_step_ids: Some(vec!["s2".into()]),
            ..WorkflowPatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["workflowId"], serde_json::json!("wf"));
        assert_eq!(json["baseVersion"], serde_json::json!(3));
        assert_eq!(json["removeStepIds"], serde_json::json!(["s2"]));
    }

    #[test]
    fn step_update_defaults_preserve_everything() {
        let update = StepUpdate::default();
        assert!(update.name.is_none());
        assert!(update.depends_on.is_none());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
