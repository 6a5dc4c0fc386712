// SPDX-License-Identifier: MIT OR Apache-2.0
//! Patch application and untrusted-input validation.
//!
//! Application order is remove → add → merge-update; every application bumps
//! the document version. Validation funnels the materialized result through
//! the validator and compiler, so nothing a planner produced reaches a store
//! or an executor unchecked.

use crate::protocol::{Planner, StepUpdate, WorkflowPatch, WorkflowProposal};
use bilko_core::error::{ErrorCode, WorkflowError};
use bilko_core::plan::CompiledPlan;
use bilko_core::{Step, Workflow};
use bilko_compiler::compiler::compile_workflow;
use bilko_handlers::HandlerRegistry;
use chrono::Utc;

/// Apply a patch to a workflow, producing the next document version.
///
/// Listed step ids are removed, `addSteps` are appended, and each
/// `updateSteps` entry is merged into its step with absent fields preserved
/// and the step `id` unchanged. The patch is assumed version-checked; use
/// [`validate_patch`] for untrusted input.
#[must_use]
pub fn apply_patch(workflow: &Workflow, patch: &WorkflowPatch) -> Workflow {
    let mut next = workflow.clone();

    if let Some(remove) = &patch.remove_step_ids {
        next.steps.retain(|step| !remove.contains(&step.id));
    }
    if let Some(add) = &patch.add_steps {
        next.steps.extend(add.iter().cloned());
    }
    if let Some(updates) = &patch.update_steps {
        for step in &mut next.steps {
            if let Some(update) = updates.get(&step.id) {
                merge_update(step, update);
            }
        }
    }
    if let Some(determinism) = &patch.determinism {
        next.determinism = determinism.clone();
    }
    if let Some(secrets) = &patch.secrets {
        next.required_secrets = secrets.clone();
    }

    next.version = workflow.version + 1;
    next.updated_at = Utc::now();
    next
}

fn merge_update(step: &mut Step, update: &StepUpdate) {
    if let Some(name) = &update.name {
        step.name = name.clone();
    }
    if let Some(step_type) = &update.step_type {
        step.step_type = step_type.clone();
    }
    if let Some(depends_on) = &update.depends_on {
        step.depends_on = depends_on.clone();
    }
    if let Some(inputs) = &update.inputs {
        step.inputs = inputs.clone();
    }
    if let Some(policy) = &update.policy {
        step.policy = policy.clone();
    }
    if let Some(determinism) = &update.determinism {
        step.determinism = determinism.clone();
    }
}

/// Validate a planner's workflow proposal.
///
/// Checks the proposal's spec version against the planner's declaration,
/// then runs the full validator and compiler over the materialized document.
///
/// # Errors
///
/// `PLANNER.VERSION_MISMATCH` when the planner proposed a spec version it
/// did not declare, otherwise the accumulated validation/compilation errors.
pub fn validate_proposal(
    planner: &dyn Planner,
    proposal: &WorkflowProposal,
    registry: &HandlerRegistry,
) -> Result<CompiledPlan, Vec<WorkflowError>> {
    let info = planner.version_info();
    if !info
        .supported_dsl_versions
        .contains(&proposal.workflow.spec_version)
    {
        return Err(vec![
            WorkflowError::new(
                ErrorCode::PlannerVersionMismatch,
                format!(
                    "planner '{}' proposed spec version '{}' outside its declared support",
                    info.name, proposal.workflow.spec_version
                ),
            )
            .with_detail("declared", serde_json::json!(info.supported_dsl_versions)),
        ]);
    }

    let compiled = compile_workflow(&proposal.workflow, registry);
    match compiled.plan {
        Some(plan) => Ok(plan),
        None => Err(compiled.errors),
    }
}

/// Validate a planner's patch against the workflow it targets.
///
/// # Errors
///
/// `PLANNER.VERSION_CONFLICT` when `baseVersion` does not match the
/// workflow's current version, otherwise the errors of compiling the patched
/// document. On success, returns the patched document together with its
/// compiled plan.
pub fn validate_patch(
    workflow: &Workflow,
    patch: &WorkflowPatch,
    registry: &HandlerRegistry,
) -> Result<(Workflow, CompiledPlan), Vec<WorkflowError>> {
    if patch.base_version != workflow.version {
        return Err(vec![
            WorkflowError::new(
                ErrorCode::PlannerVersionConflict,
                format!(
                    "patch targets version {} but workflow '{}' is at version {}",
                    patch.base_version, workflow.id, workflow.version
                ),
            )
            .with_detail("baseVersion", serde_json::json!(patch.base_version))
            .with_detail("currentVersion", serde_json::json!(workflow.version)),
        ]);
    }

    let patched = apply_patch(workflow, patch);
    let compiled = compile_workflow(&patched, registry);
    match compiled.plan {
        Some(plan) => Ok((patched, plan)),
        None => Err(compiled.errors),
    }
}
