// SPDX-License-Identifier: MIT OR Apache-2.0
//! The certification suite and a deterministic reference planner.
//!
//! `certify_planner` exercises any [`Planner`] implementation against a
//! closed set of checks. Hosts run it once before accepting a planner;
//! a failed report means the planner's outputs cannot be trusted to survive
//! the validator.

use crate::patch::{validate_patch, validate_proposal};
use crate::protocol::{Planner, PlannerVersionInfo, RepairRequest, StepUpdate, WorkflowPatch, WorkflowProposal};
use bilko_core::error::{ErrorCode, WorkflowError};
use bilko_core::{SUPPORTED_SPEC_VERSIONS, StepBuilder, Workflow, WorkflowBuilder};
use bilko_compiler::validator::validate_workflow;
use bilko_handlers::HandlerRegistry;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Outcome of one certification check.
#[derive(Debug, Clone)]
pub struct CertificationTest {
    /// Check name.
    pub name: String,

    /// Whether the check passed.
    pub passed: bool,

    /// Failure explanation, absent on pass.
    pub message: Option<String>,
}

/// Outcome of the full certification suite.
#[derive(Debug, Clone)]
pub struct CertificationReport {
    /// `true` when every check passed.
    pub passed: bool,

    /// Per-check outcomes, in execution order.
    pub tests: Vec<CertificationTest>,

    /// Errors collected from failed checks.
    pub errors: Vec<WorkflowError>,
}

/// Run the closed certification suite against a planner.
///
/// Checks: version-info completeness, declared versions are recognized,
/// `propose_workflow` for a simple goal compiles, and `propose_repair`
/// returns a patch that validates.
pub async fn certify_planner(planner: &dyn Planner) -> CertificationReport {
    let registry = HandlerRegistry::new();
    let mut tests = Vec::new();
    let mut errors = Vec::new();

    let info = planner.version_info();
    tests.push(check_version_info(&info));
    tests.push(check_supported_versions(&info));
    tests.push(check_proposal(planner, &registry, &mut errors).await);
    tests.push(check_repair(planner, &registry, &mut errors).await);

    CertificationReport {
        passed: tests.iter().all(|t| t.passed),
        tests,
        errors,
    }
}

fn pass(name: &str) -> CertificationTest {
    CertificationTest {
        name: name.to_string(),
        passed: true,
        message: None,
    }
}

fn fail(name: &str, message: impl Into<String>) -> CertificationTest {
    CertificationTest {
        name: name.to_string(),
        passed: false,
        message: Some(message.into()),
    }
}

fn check_version_info(info: &PlannerVersionInfo) -> CertificationTest {
    let name = "version-info-complete";
    if info.name.trim().is_empty() || info.version.trim().is_empty() {
        return fail(name, "planner name and version must be non-empty");
    }
    if info.supported_dsl_versions.is_empty() {
        return fail(name, "planner declares no supported DSL versions");
    }
    pass(name)
}

fn check_supported_versions(info: &PlannerVersionInfo) -> CertificationTest {
    let name = "supported-versions-recognized";
    let unknown: Vec<&String> = info
        .supported_dsl_versions
        .iter()
        .filter(|v| !SUPPORTED_SPEC_VERSIONS.contains(&v.as_str()))
        .collect();
    if unknown.is_empty() {
        pass(name)
    } else {
        fail(name, format!("declared versions not recognized: {unknown:?}"))
    }
}

async fn check_proposal(
    planner: &dyn Planner,
    registry: &HandlerRegistry,
    errors: &mut Vec<WorkflowError>,
) -> CertificationTest {
    let name = "propose-workflow-compiles";
    match planner
        .propose_workflow("transform an input value into an output value")
        .await
    {
        Ok(proposal) => match validate_proposal(planner, &proposal, registry) {
            Ok(_) => pass(name),
            Err(validation_errors) => {
                let message = format!("{} validation errors", validation_errors.len());
                errors.extend(validation_errors);
                fail(name, message)
            }
        },
        Err(error) => {
            let message = error.to_string();
            errors.push(error);
            fail(name, message)
        }
    }
}

async fn check_repair(
    planner: &dyn Planner,
    registry: &HandlerRegistry,
    errors: &mut Vec<WorkflowError>,
) -> CertificationTest {
    let name = "propose-repair-validates";

    // A document with one dangling dependency: the canonical repair target.
    let broken = WorkflowBuilder::new("cert-broken", "broken fixture")
        .step(StepBuilder::new("a", "transform.map").build())
        .step(StepBuilder::new("b", "transform.map").depends_on("ghost").build())
        .build();
    let validation = validate_workflow(&broken);
    let request = RepairRequest {
        workflow: broken.clone(),
        suggested_fixes: validation
            .errors
            .iter()
            .flat_map(|e| e.suggested_fixes.clone())
            .collect(),
        errors: validation.errors,
    };

    match planner.propose_repair(&request).await {
        Ok(patch) => match validate_patch(&broken, &patch, registry) {
            Ok(_) => pass(name),
            Err(validation_errors) => {
                let message = format!("repair patch failed validation ({} errors)", validation_errors.len());
                errors.extend(validation_errors);
                fail(name, message)
            }
        },
        Err(error) => {
            let message = error.to_string();
            errors.push(error);
            fail(name, message)
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedPlanner
// ---------------------------------------------------------------------------

/// A deterministic planner for tests and certification fixtures.
///
/// Proposes a single-step transform workflow for any goal and repairs
/// documents by applying the `remove-dependency` fixes the validator
/// suggested. No model, no network, no randomness.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPlanner;

impl ScriptedPlanner {
    /// Create a scripted planner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    fn version_info(&self) -> PlannerVersionInfo {
        PlannerVersionInfo {
            name: "scripted".to_string(),
            version: "0.1.0".to_string(),
            supported_dsl_versions: SUPPORTED_SPEC_VERSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            supported_step_packs: vec!["transform".to_string()],
        }
    }

    async fn propose_workflow(&self, goal: &str) -> Result<WorkflowProposal, WorkflowError> {
        let workflow = WorkflowBuilder::new("scripted-proposal", goal)
            .description(format!("scripted draft for: {goal}"))
            .step(
                StepBuilder::new("s1", "transform.map")
                    .input("expression", serde_json::json!("identity"))
                    .build(),
            )
            .build();
        Ok(WorkflowProposal {
            workflow,
            rationale: Some("single transform covers the goal".to_string()),
        })
    }

    async fn propose_patch(
        &self,
        base: &Workflow,
        goal: &str,
    ) -> Result<WorkflowPatch, WorkflowError> {
        let last_step = base.steps.last().map(|s| s.id.clone());
        let mut step = StepBuilder::new("scripted-append", "transform.map")
            .name(format!("append for: {goal}"));
        if let Some(dep) = last_step {
            step = step.depends_on(dep);
        }
        Ok(WorkflowPatch {
            workflow_id: base.id.clone(),
            base_version: base.version,
            add_steps: Some(vec![step.build()]),
            ..WorkflowPatch::default()
        })
    }

    async fn propose_repair(&self, request: &RepairRequest) -> Result<WorkflowPatch, WorkflowError> {
        let mut updates: BTreeMap<String, StepUpdate> = BTreeMap::new();

        for error in &request.errors {
            if error.code != ErrorCode::UnknownDependency
                && error.code != ErrorCode::SelfDependency
            {
                continue;
            }
            let Some(step_id) = &error.step_id else { continue };
            let Some(step) = request.workflow.step(step_id) else { continue };
            let broken: Vec<String> = error
                .suggested_fixes
                .iter()
                .filter(|f| f.fix_type == "remove-dependency")
                .filter_map(|f| f.params.get("dependency"))
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect();
            let mut kept: Vec<String> = step
                .depends_on
                .iter()
                .filter(|d| !broken.contains(d))
                .cloned()
                .collect();
            // A detached step would be unreachable; hang it off the entry.
            if kept.is_empty() && step_id != &request.workflow.entry_step_id {
                kept.push(request.workflow.entry_step_id.clone());
            }
            updates.insert(
                step_id.clone(),
                StepUpdate {
                    depends_on: Some(kept),
                    ..StepUpdate::default()
                },
            );
        }

        if updates.is_empty() {
            return Err(WorkflowError::new(
                ErrorCode::PlannerLlmParse,
                "no applicable repair for the reported errors",
            ));
        }

        Ok(WorkflowPatch {
            workflow_id: request.workflow.id.clone(),
            base_version: request.workflow.version,
            update_steps: Some(updates),
            ..WorkflowPatch::default()
        })
    }
}
