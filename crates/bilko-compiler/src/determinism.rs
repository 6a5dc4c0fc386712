// SPDX-License-Identifier: MIT OR Apache-2.0
//! Determinism rules and achievable-grade derivation.
//!
//! Two separate questions are answered here. First, does the step set obey
//! the rules of the grade the document *targets*? Second, what grade could
//! this step set *achieve* regardless of the target? The validator rejects
//! on the first; the compiler records both in the plan's analysis.

use bilko_core::plan::DeterminismViolation;
use bilko_core::vocab::{is_ai_type, is_external_api_type};
use bilko_core::{DeterminismGrade, EvidenceCapture, ExternalDependency, Step, Workflow};

/// Rule key: a Pure workflow may not contain external-API step types.
pub const RULE_PURE_NO_EXTERNAL_API: &str = "pure-no-external-api";
/// Rule key: a Pure workflow may not contain AI step types.
pub const RULE_PURE_NO_AI: &str = "pure-no-ai";
/// Rule key: a Pure workflow may not contain steps that read a clock.
pub const RULE_PURE_NO_TIME: &str = "pure-no-time";
/// Rule key: a Replayable workflow's external steps must declare `usesExternalApis`.
pub const RULE_REPLAYABLE_DECLARE_EXTERNAL: &str = "replayable-declare-external";
/// Rule key: a Replayable workflow's non-deterministic dependencies must capture evidence.
pub const RULE_REPLAYABLE_EVIDENCE_CAPTURE: &str = "replayable-evidence-capture";

/// Check the target-grade rules over a workflow's step set.
///
/// Returns one violation per offending step or dependency; empty when the
/// declaration is satisfiable.
#[must_use]
pub fn check_target_rules(workflow: &Workflow) -> Vec<DeterminismViolation> {
    match workflow.determinism.target_grade {
        DeterminismGrade::Pure => check_pure(workflow),
        DeterminismGrade::Replayable => check_replayable(workflow),
        DeterminismGrade::BestEffort => Vec::new(),
    }
}

fn check_pure(workflow: &Workflow) -> Vec<DeterminismViolation> {
    let mut violations = Vec::new();
    for step in &workflow.steps {
        if is_external_api_type(&step.step_type) {
            violations.push(DeterminismViolation {
                rule: RULE_PURE_NO_EXTERNAL_API.to_string(),
                step_id: Some(step.id.clone()),
                message: format!(
                    "step '{}' has external-API type '{}', forbidden at grade pure",
                    step.id, step.step_type
                ),
            });
        }
        if is_ai_type(&step.step_type) {
            violations.push(DeterminismViolation {
                rule: RULE_PURE_NO_AI.to_string(),
                step_id: Some(step.id.clone()),
                message: format!(
                    "step '{}' has AI type '{}', forbidden at grade pure",
                    step.id, step.step_type
                ),
            });
        }
        if step.determinism.uses_time {
            violations.push(DeterminismViolation {
                rule: RULE_PURE_NO_TIME.to_string(),
                step_id: Some(step.id.clone()),
                message: format!("step '{}' declares usesTime, forbidden at grade pure", step.id),
            });
        }
    }
    violations
}

fn check_replayable(workflow: &Workflow) -> Vec<DeterminismViolation> {
    let mut violations = Vec::new();
    for step in &workflow.steps {
        let external_kind = is_external_api_type(&step.step_type) || is_ai_type(&step.step_type);
        if external_kind && !step.determinism.uses_external_apis {
            violations.push(DeterminismViolation {
                rule: RULE_REPLAYABLE_DECLARE_EXTERNAL.to_string(),
                step_id: Some(step.id.clone()),
                message: format!(
                    "step '{}' has type '{}' but does not declare usesExternalApis",
                    step.id, step.step_type
                ),
            });
        }
        for dep in step_dependencies(step) {
            if !dep.deterministic && dep.evidence_capture == EvidenceCapture::None {
                violations.push(DeterminismViolation {
                    rule: RULE_REPLAYABLE_EVIDENCE_CAPTURE.to_string(),
                    step_id: Some(step.id.clone()),
                    message: format!(
                        "non-deterministic dependency '{}' on step '{}' captures no evidence",
                        dep.name, step.id
                    ),
                });
            }
        }
    }
    for dep in &workflow.determinism.external_dependencies {
        if !dep.deterministic && dep.evidence_capture == EvidenceCapture::None {
            violations.push(DeterminismViolation {
                rule: RULE_REPLAYABLE_EVIDENCE_CAPTURE.to_string(),
                step_id: None,
                message: format!(
                    "non-deterministic dependency '{}' captures no evidence",
                    dep.name
                ),
            });
        }
    }
    violations
}

fn step_dependencies(step: &Step) -> &[ExternalDependency] {
    step.determinism
        .external_dependencies
        .as_deref()
        .unwrap_or(&[])
}

/// Derive the best grade the step set can achieve.
///
/// Starts at Pure; demoted to Replayable when any step uses time or external
/// APIs; demoted to BestEffort when any non-deterministic external
/// dependency captures no evidence, or when an AI step reads the wall clock.
#[must_use]
pub fn derive_achievable_grade(workflow: &Workflow) -> DeterminismGrade {
    let mut grade = DeterminismGrade::Pure;

    for step in &workflow.steps {
        let external_kind = is_external_api_type(&step.step_type) || is_ai_type(&step.step_type);
        if step.determinism.uses_time || step.determinism.uses_external_apis || external_kind {
            grade = grade.max(DeterminismGrade::Replayable);
        }
        if is_ai_type(&step.step_type) && step.determinism.time_source.as_deref() == Some("wall-clock")
        {
            return DeterminismGrade::BestEffort;
        }
        for dep in step_dependencies(step) {
            if !dep.deterministic && dep.evidence_capture == EvidenceCapture::None {
                return DeterminismGrade::BestEffort;
            }
        }
    }
    for dep in &workflow.determinism.external_dependencies {
        if !dep.deterministic && dep.evidence_capture == EvidenceCapture::None {
            return DeterminismGrade::BestEffort;
        }
    }
    grade
}

#[cfg(test)]
mod tests {
    use super::*;
    use bilko_core::{StepBuilder, WorkflowBuilder};

    fn pure_workflow() -> Workflow {
        WorkflowBuilder::new("wf", "pure")
            .target_grade(DeterminismGrade::Pure)
            .step(StepBuilder::new("s1", "transform.map").build())
            .build()
    }

    #[test]
    fn pure_transform_has_no_violations() {
        assert!(check_target_rules(&pure_workflow()).is_empty());
        assert_eq!(derive_achievable_grade(&pure_workflow()), DeterminismGrade::Pure);
    }

    #[test]
    fn pure_rejects_http_steps() {
        let wf = WorkflowBuilder::new("wf", "impure")
            .target_grade(DeterminismGrade::Pure)
            .step(StepBuilder::new("s1", "http.search").external_api().build())
            .build();
        let violations = check_target_rules(&wf);
        assert!(violations.iter().any(|v| v.rule == RULE_PURE_NO_EXTERNAL_API));
    }

    #[test]
    fn pure_rejects_time_readers() {
        let wf = WorkflowBuilder::new("wf", "timed")
            .target_grade(DeterminismGrade::Pure)
            .step(StepBuilder::new("s1", "transform.map").uses_time("wall-clock").build())
            .build();
        let violations = check_target_rules(&wf);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, RULE_PURE_NO_TIME);
    }

    #[test]
    fn replayable_requires_declaration_on_external_steps() {
        let wf = WorkflowBuilder::new("wf", "undeclared")
            .target_grade(DeterminismGrade::Replayable)
            .step(StepBuilder::new("s1", "http.get").build())
            .build();
        let violations = check_target_rules(&wf);
        assert!(
            violations
                .iter()
                .any(|v| v.rule == RULE_REPLAYABLE_DECLARE_EXTERNAL)
        );
    }

    #[test]
    fn replayable_requires_evidence_on_nondeterministic_deps() {
        let wf = WorkflowBuilder::new("wf", "no-evidence")
            .target_grade(DeterminismGrade::Replayable)
            .step(
                StepBuilder::new("s1", "http.get")
                    .external_api()
                    .external_dependency(ExternalDependency {
                        name: "api.example.com".into(),
                        deterministic: false,
                        evidence_capture: EvidenceCapture::None,
                    })
                    .build(),
            )
            .build();
        let violations = check_target_rules(&wf);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, RULE_REPLAYABLE_EVIDENCE_CAPTURE);
    }

    #[test]
    fn best_effort_permits_everything() {
        let wf = WorkflowBuilder::new("wf", "anything")
            .step(StepBuilder::new("s1", "ai.complete").build())
            .build();
        assert!(check_target_rules(&wf).is_empty());
    }

    #[test]
    fn external_steps_demote_achievable_to_replayable() {
        let wf = WorkflowBuilder::new("wf", "external")
            .step(StepBuilder::new("s1", "http.get").external_api().build())
            .build();
        assert_eq!(derive_achievable_grade(&wf), DeterminismGrade::Replayable);
    }

    #[test]
    fn wall_clock_ai_step_demotes_to_best_effort() {
        let wf = WorkflowBuilder::new("wf", "clocked-ai")
            .step(StepBuilder::new("s1", "ai.complete").uses_time("wall-clock").build())
            .build();
        assert_eq!(derive_achievable_grade(&wf), DeterminismGrade::BestEffort);
    }

    #[test]
    fn uncaptured_dependency_demotes_to_best_effort() {
        let wf = WorkflowBuilder::new("wf", "uncaptured")
            .step(
                StepBuilder::new("s1", "http.get")
                    .external_api()
                    .external_dependency(ExternalDependency {
                        name: "feed".into(),
                        deterministic: false,
                        evidence_capture: EvidenceCapture::None,
                    })
                    .build(),
            )
            .build();
        assert_eq!(derive_achievable_grade(&wf), DeterminismGrade::BestEffort);
    }
}
