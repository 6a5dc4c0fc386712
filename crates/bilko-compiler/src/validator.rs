// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema, graph, and determinism validation.
//!
//! Missing top-level fields fail fast; every other family of checks runs
//! independently and accumulates, so one pass reports everything a repair
//! loop needs. The validator is total: it never raises, whatever the input.

use crate::determinism;
use bilko_core::error::{ErrorCode, SuggestedFix, WorkflowError};
use bilko_core::plan::DeterminismViolation;
use bilko_core::{
    MAX_ATTEMPTS_LIMIT, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS, SUPPORTED_SPEC_VERSIONS, Step, Workflow,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Hard cap on step count.
const MAX_STEPS: usize = 100;
/// Step count at which a size warning is emitted.
const WARN_STEPS: usize = 50;

/// Outcome of validating a workflow document.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// `true` when no errors were found.
    pub valid: bool,

    /// Rejections, each with suggested fixes.
    pub errors: Vec<WorkflowError>,

    /// Non-fatal observations.
    pub warnings: Vec<String>,

    /// Determinism violations, also mirrored into `errors`.
    pub determinism_violations: Vec<DeterminismViolation>,
}

/// Validate a workflow document.
///
/// # Examples
///
/// ```
/// use bilko_core::{StepBuilder, WorkflowBuilder};
///
/// let wf = WorkflowBuilder::new("wf", "ok")
///     .step(StepBuilder::new("s1", "transform.map").build())
///     .build();
/// let result = bilko_compiler::validate_workflow(&wf);
/// assert!(result.valid);
/// ```
#[must_use]
pub fn validate_workflow(workflow: &Workflow) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_required_fields(workflow, &mut result.errors);
    if !result.errors.is_empty() {
        // Without id, entry, and steps the remaining checks would only
        // produce noise; fail fast.
        return result;
    }

    check_spec_version(workflow, &mut result.errors);
    check_size(workflow, &mut result);
    check_step_fields(workflow, &mut result.errors);
    check_graph(workflow, &mut result.errors);
    check_determinism(workflow, &mut result);

    result.valid = result.errors.is_empty();
    result
}

fn check_required_fields(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    let mut missing = |field: &str| {
        errors.push(
            WorkflowError::new(
                ErrorCode::MissingField,
                format!("required field '{field}' is missing or empty"),
            )
            .with_fix(
                SuggestedFix::new("set-field").param("field", serde_json::json!(field)),
            ),
        );
    };

    if workflow.id.trim().is_empty() {
        missing("id");
    }
    if workflow.name.trim().is_empty() {
        missing("name");
    }
    if workflow.spec_version.trim().is_empty() {
        missing("specVersion");
    }
    if workflow.entry_step_id.trim().is_empty() {
        missing("entryStepId");
    }
    if workflow.steps.is_empty() {
        errors.push(
            WorkflowError::new(ErrorCode::EmptyWorkflow, "workflow declares no steps").with_fix(
                SuggestedFix::new("add-step").describe("declare at least one step"),
            ),
        );
    }
}

fn check_spec_version(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    if !SUPPORTED_SPEC_VERSIONS.contains(&workflow.spec_version.as_str()) {
        errors.push(
            WorkflowError::new(
                ErrorCode::UnsupportedSpecVersion,
                format!("spec version '{}' is not supported", workflow.spec_version),
            )
            .with_detail("supported", serde_json::json!(SUPPORTED_SPEC_VERSIONS))
            .with_fix(
                SuggestedFix::new("set-spec-version")
                    .param("specVersion", serde_json::json!(SUPPORTED_SPEC_VERSIONS[0])),
            ),
        );
    }
}

fn check_size(workflow: &Workflow, result: &mut ValidationResult) {
    let count = workflow.steps.len();
    if count > MAX_STEPS {
        result.errors.push(
            WorkflowError::new(
                ErrorCode::PolicyRange,
                format!("workflow declares {count} steps; the limit is {MAX_STEPS}"),
            )
            .with_fix(SuggestedFix::new("split-workflow").describe("split into smaller workflows")),
        );
    } else if count > WARN_STEPS {
        result
            .warnings
            .push(format!("workflow declares {count} steps; large graphs slow repair loops"));
    }
}

fn check_step_fields(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    let ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for step in &workflow.steps {
        if step.id.trim().is_empty() {
            errors.push(
                WorkflowError::new(ErrorCode::MissingField, "step with empty id")
                    .with_fix(SuggestedFix::new("set-field").param("field", serde_json::json!("id"))),
            );
            continue;
        }
        if !seen.insert(step.id.as_str()) {
            errors.push(
                WorkflowError::new(
                    ErrorCode::DuplicateStepId,
                    format!("step id '{}' is declared more than once", step.id),
                )
                .with_step(step.id.clone())
                .with_fix(
                    SuggestedFix::new("rename-step").param("stepId", serde_json::json!(step.id)),
                ),
            );
        }
        for dep in &step.depends_on {
            if dep == &step.id {
                errors.push(
                    WorkflowError::new(
                        ErrorCode::SelfDependency,
                        format!("step '{}' depends on itself", step.id),
                    )
                    .with_step(step.id.clone())
                    .with_fix(
                        SuggestedFix::new("remove-dependency")
                            .param("stepId", serde_json::json!(step.id))
                            .param("dependency", serde_json::json!(dep)),
                    ),
                );
            } else if !ids.contains(dep.as_str()) {
                errors.push(
                    WorkflowError::new(
                        ErrorCode::UnknownDependency,
                        format!("step '{}' depends on unknown step '{dep}'", step.id),
                    )
                    .with_step(step.id.clone())
                    .with_fix(
                        SuggestedFix::new("remove-dependency")
                            .param("stepId", serde_json::json!(step.id))
                            .param("dependency", serde_json::json!(dep)),
                    ),
                );
            }
        }
        check_policy(step, errors);
    }
}

fn check_policy(step: &Step, errors: &mut Vec<WorkflowError>) {
    let policy = &step.policy;
    if policy.max_attempts < 1 || policy.max_attempts > MAX_ATTEMPTS_LIMIT {
        errors.push(
            WorkflowError::new(
                ErrorCode::PolicyRange,
                format!(
                    "step '{}' maxAttempts {} outside 1..={MAX_ATTEMPTS_LIMIT}",
                    step.id, policy.max_attempts
                ),
            )
            .with_step(step.id.clone())
            .with_fix(
                SuggestedFix::new("set-policy-field")
                    .param("field", serde_json::json!("maxAttempts"))
                    .param("min", serde_json::json!(1))
                    .param("max", serde_json::json!(MAX_ATTEMPTS_LIMIT)),
            ),
        );
    }
    if policy.timeout_ms < MIN_TIMEOUT_MS || policy.timeout_ms > MAX_TIMEOUT_MS {
        errors.push(
            WorkflowError::new(
                ErrorCode::PolicyRange,
                format!(
                    "step '{}' timeoutMs {} outside {MIN_TIMEOUT_MS}..={MAX_TIMEOUT_MS}",
                    step.id, policy.timeout_ms
                ),
            )
            .with_step(step.id.clone())
            .with_fix(
                SuggestedFix::new("set-policy-field")
                    .param("field", serde_json::json!("timeoutMs"))
                    .param("min", serde_json::json!(MIN_TIMEOUT_MS))
                    .param("max", serde_json::json!(MAX_TIMEOUT_MS)),
            ),
        );
    }
}

fn check_graph(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    let ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();

    let entry = workflow.entry_step_id.as_str();
    if !ids.contains(entry) {
        errors.push(
            WorkflowError::new(
                ErrorCode::EntryNotFound,
                format!("entryStepId '{entry}' names no declared step"),
            )
            .with_fix(
                SuggestedFix::new("set-entry-step").param(
                    "available",
                    serde_json::json!(workflow.steps.iter().map(|s| &s.id).collect::<Vec<_>>()),
                ),
            ),
        );
        // Reachability needs a resolvable entry; cycle detection still runs.
        detect_cycles(workflow, errors);
        return;
    }

    if workflow.step(entry).is_some_and(|s| !s.depends_on.is_empty()) {
        errors.push(
            WorkflowError::new(
                ErrorCode::EntryHasDependencies,
                format!("entry step '{entry}' must not declare dependencies"),
            )
            .with_step(entry.to_string())
            .with_fix(SuggestedFix::new("clear-entry-dependencies")),
        );
    }

    detect_cycles(workflow, errors);
    check_reachability(workflow, errors);
}

/// DFS three-coloring. White = unvisited, gray = on the stack, black = done.
fn detect_cycles(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let index: HashMap<&str, &Step> = workflow.steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut colors: HashMap<&str, Color> =
        workflow.steps.iter().map(|s| (s.id.as_str(), Color::White)).collect();
    let mut cycle_members: Vec<String> = Vec::new();

    fn visit<'a>(
        id: &'a str,
        index: &HashMap<&'a str, &'a Step>,
        colors: &mut HashMap<&'a str, Color>,
        cycle_members: &mut Vec<String>,
    ) -> bool {
        colors.insert(id, Color::Gray);
        if let Some(step) = index.get(id) {
            for dep in &step.depends_on {
                match colors.get(dep.as_str()) {
                    Some(Color::Gray) => {
                        cycle_members.push(dep.clone());
                        cycle_members.push(id.to_string());
                        colors.insert(id, Color::Black);
                        return true;
                    }
                    Some(Color::White) => {
                        if visit(dep.as_str(), index, colors, cycle_members) {
                            colors.insert(id, Color::Black);
                            return true;
                        }
                    }
                    _ => {}
                }
            }
        }
        colors.insert(id, Color::Black);
        false
    }

    let mut found = false;
    for step in &workflow.steps {
        if colors.get(step.id.as_str()) == Some(&Color::White)
            && visit(step.id.as_str(), &index, &mut colors, &mut cycle_members)
        {
            found = true;
            break;
        }
    }

    if found {
        cycle_members.sort();
        cycle_members.dedup();
        errors.push(
            WorkflowError::new(
                ErrorCode::CycleDetected,
                format!("dependency cycle involving steps {cycle_members:?}"),
            )
            .with_detail("steps", serde_json::json!(cycle_members))
            .with_fix(
                SuggestedFix::new("remove-dependency")
                    .describe("break the cycle by removing one dependency edge"),
            ),
        );
    }
}

/// BFS over forward edges (dependency → dependent) from the entry step.
fn check_reachability(workflow: &Workflow, errors: &mut Vec<WorkflowError>) {
    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &workflow.steps {
        for dep in &step.depends_on {
            forward.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reached.insert(workflow.entry_step_id.as_str());
    queue.push_back(workflow.entry_step_id.as_str());
    while let Some(id) = queue.pop_front() {
        for next in forward.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    for step in &workflow.steps {
        if !reached.contains(step.id.as_str()) {
            errors.push(
                WorkflowError::new(
                    ErrorCode::UnreachableStep,
                    format!(
                        "step '{}' is not reachable from entry step '{}'",
                        step.id, workflow.entry_step_id
                    ),
                )
                .with_step(step.id.clone())
                .with_fix(
                    SuggestedFix::new("add-dependency")
                        .param("stepId", serde_json::json!(step.id))
                        .describe("connect the step to the graph or remove it"),
                ),
            );
        }
    }
}

fn check_determinism(workflow: &Workflow, result: &mut ValidationResult) {
    let violations = determinism::check_target_rules(workflow);
    for violation in &violations {
        let mut error = WorkflowError::new(ErrorCode::DeterminismViolation, violation.message.clone())
            .with_detail("rule", serde_json::json!(violation.rule))
            .with_fix(
                SuggestedFix::new("lower-target-grade")
                    .param("targetGrade", serde_json::json!("best-effort")),
            );
        if let Some(step_id) = &violation.step_id {
            error = error.with_step(step_id.clone());
        }
        result.errors.push(error);
    }
    result.determinism_violations = violations;
}
