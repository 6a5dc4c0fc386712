// SPDX-License-Identifier: MIT OR Apache-2.0
//! The compilation pipeline.
//!
//! Validate → topologically sort → compile steps → check handler contracts →
//! analyze determinism → hash. Any phase's failure short-circuits the
//! remaining phases and returns the accumulated errors.

use crate::determinism;
use crate::validator;
use bilko_core::error::{ErrorCode, SuggestedFix, WorkflowError};
use bilko_core::hash::content_hash;
use bilko_core::plan::{CompiledPlan, CompiledStep, DeterminismAnalysis, implementation_version};
use bilko_core::{Step, Workflow};
use bilko_handlers::{HandlerRegistry, InputContract};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Outcome of compiling a workflow document.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// `true` when a plan was produced.
    pub success: bool,

    /// The compiled plan, present on success.
    pub plan: Option<CompiledPlan>,

    /// Accumulated errors, empty on success.
    pub errors: Vec<WorkflowError>,
}

impl CompilationResult {
    fn failure(errors: Vec<WorkflowError>) -> Self {
        Self {
            success: false,
            plan: None,
            errors,
        }
    }
}

/// The canonical form the plan hash is computed over.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanHashInput<'a> {
    execution_order: &'a [String],
    steps: &'a [CompiledStep],
}

/// Compile a workflow into a content-addressed plan.
///
/// Handler input contracts are checked against `registry`; a step type with
/// no registered handler is *not* a compile error (it fails at execution
/// time instead).
#[must_use]
pub fn compile_workflow(workflow: &Workflow, registry: &HandlerRegistry) -> CompilationResult {
    // Phase 1: validate.
    let validation = validator::validate_workflow(workflow);
    if !validation.valid {
        return CompilationResult::failure(validation.errors);
    }

    // Phase 2: topological order via Kahn's algorithm.
    let Some(execution_order) = kahn_sort(&workflow.steps) else {
        return CompilationResult::failure(vec![
            WorkflowError::new(
                ErrorCode::Compilation,
                "steps admit no topological order; the dependency graph is cyclic",
            )
            .with_fix(SuggestedFix::new("remove-dependency").describe("break the cycle")),
        ]);
    };

    // Phase 3: compile each step in execution order.
    let steps: Vec<CompiledStep> = execution_order
        .iter()
        .filter_map(|id| workflow.step(id))
        .map(compile_step)
        .collect();

    // Phase 4: handler input contracts.
    let contract_errors = check_handler_contracts(&steps, registry);
    if !contract_errors.is_empty() {
        return CompilationResult::failure(contract_errors);
    }

    // Phase 5: determinism analysis.
    let violations = determinism::check_target_rules(workflow);
    let analysis = DeterminismAnalysis {
        target: workflow.determinism.target_grade,
        achievable: determinism::derive_achievable_grade(workflow),
        satisfied: violations.is_empty(),
        violations,
    };

    // Phase 6: content addressing.
    let workflow_hash = match content_hash(workflow) {
        Ok(hash) => hash,
        Err(err) => {
            return CompilationResult::failure(vec![WorkflowError::new(
                ErrorCode::Compilation,
                format!("workflow could not be canonicalized: {err}"),
            )]);
        }
    };
    let plan_hash = match content_hash(&PlanHashInput {
        execution_order: &execution_order,
        steps: &steps,
    }) {
        Ok(hash) => hash,
        Err(err) => {
            return CompilationResult::failure(vec![WorkflowError::new(
                ErrorCode::Compilation,
                format!("plan could not be canonicalized: {err}"),
            )]);
        }
    };

    debug!(
        target: "bilko.compiler",
        workflow = %workflow.id,
        steps = steps.len(),
        plan_hash = %plan_hash.hex,
        "compiled"
    );

    CompilationResult {
        success: true,
        plan: Some(CompiledPlan {
            workflow_id: workflow.id.clone(),
            workflow_version: workflow.version,
            spec_version: workflow.spec_version.clone(),
            workflow_hash,
            plan_hash,
            execution_order,
            steps,
            determinism: analysis,
            compiled_at: Utc::now(),
        }),
        errors: Vec::new(),
    }
}

/// Kahn's algorithm over the dependency graph.
///
/// Returns `None` when no full order exists (a cycle the validator did not
/// report). Ties resolve in document order, so equal graphs compile to equal
/// plans.
fn kahn_sort(steps: &[Step]) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        steps.iter().map(|s| (s.id.as_str(), s.depends_on.len())).collect();
    // Adjacency from dependency to dependent.
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = steps
        .iter()
        .filter(|s| s.depends_on.is_empty())
        .map(|s| s.id.as_str())
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(steps.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            let degree = in_degree.get_mut(dependent)?;
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    (order.len() == steps.len()).then_some(order)
}

fn compile_step(step: &Step) -> CompiledStep {
    CompiledStep {
        id: step.id.clone(),
        name: step.name.clone(),
        step_type: step.step_type.clone(),
        implementation_version: implementation_version(&step.step_type),
        depends_on: step.depends_on.clone(),
        inputs: step.inputs.clone(),
        policy: step.policy.clone(),
        determinism: step.determinism.clone(),
    }
}

fn check_handler_contracts(
    steps: &[CompiledStep],
    registry: &HandlerRegistry,
) -> Vec<WorkflowError> {
    let mut errors = Vec::new();
    for step in steps {
        let Some(handler) = registry.get(&step.step_type) else {
            continue;
        };
        let Some(contract) = handler.input_contract() else {
            continue;
        };
        check_contract(step, &contract, &mut errors);
    }
    errors
}

fn check_contract(step: &CompiledStep, contract: &InputContract, errors: &mut Vec<WorkflowError>) {
    for field in &contract.fields {
        let value = step.inputs.get(&field.name);

        let Some(value) = value else {
            if field.required {
                errors.push(contract_error(
                    step,
                    format!("required input '{}' is missing", field.name),
                    &field.name,
                    SuggestedFix::new("set-input")
                        .param("field", serde_json::json!(field.name))
                        .param("type", serde_json::json!(field.field_type.as_str())),
                ));
            }
            continue;
        };

        if !field.field_type.matches(value) {
            errors.push(contract_error(
                step,
                format!(
                    "input '{}' must be of type {}",
                    field.name, field.field_type
                ),
                &field.name,
                SuggestedFix::new("set-input")
                    .param("field", serde_json::json!(field.name))
                    .param("type", serde_json::json!(field.field_type.as_str())),
            ));
            continue;
        }

        if let Some(source) = &field.allowed {
            let allowed = source.resolve();
            if !allowed.contains(value) {
                errors.push(contract_error(
                    step,
                    format!("input '{}' is not an allowed value", field.name),
                    &field.name,
                    SuggestedFix::new("set-input")
                        .param("field", serde_json::json!(field.name))
                        .param("allowedValues", serde_json::json!(allowed)),
                ));
            }
        }
    }
}

fn contract_error(
    step: &CompiledStep,
    message: String,
    field: &str,
    fix: SuggestedFix,
) -> WorkflowError {
    WorkflowError::new(ErrorCode::HandlerContract, message)
        .with_step(step.id.clone())
        .with_detail("field", serde_json::json!(field))
        .with_detail("stepType", serde_json::json!(step.step_type))
        .with_fix(fix)
}

/// Run handler-declared pre-flight probes over a compiled plan.
///
/// Returns additional errors without mutating the plan. Steps whose type has
/// no registered handler are skipped.
pub async fn validate_handlers(
    plan: &CompiledPlan,
    registry: &HandlerRegistry,
) -> Vec<WorkflowError> {
    let mut errors = Vec::new();
    for step in &plan.steps {
        let Some(handler) = registry.get(&step.step_type) else {
            continue;
        };
        if let Err(error) = handler.validate(step).await {
            errors.push(error.with_step(step.id.clone()));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bilko_core::{DeterminismGrade, StepBuilder, WorkflowBuilder};
    use bilko_handlers::{
        ContractField, FieldType, HandlerFailure, StepContext, StepHandler, StepOutputs,
    };

    struct WithContract;

    #[async_trait]
    impl StepHandler for WithContract {
        fn step_type(&self) -> &str {
            "transform.map"
        }

        fn input_contract(&self) -> Option<InputContract> {
            Some(
                InputContract::new()
                    .field(ContractField::required("expression", FieldType::String))
                    .field(
                        ContractField::optional("mode", FieldType::String)
                            .one_of(vec![serde_json::json!("strict"), serde_json::json!("lenient")]),
                    ),
            )
        }

        async fn execute(
            &self,
            _step: &CompiledStep,
            _ctx: &StepContext,
        ) -> Result<StepOutputs, HandlerFailure> {
            Ok(StepOutputs::new())
        }
    }

    struct FailsPreflight;

    #[async_trait]
    impl StepHandler for FailsPreflight {
        fn step_type(&self) -> &str {
            "ai.complete"
        }

        async fn validate(&self, _step: &CompiledStep) -> Result<(), WorkflowError> {
            Err(WorkflowError::new(
                ErrorCode::ExternalApiConfig,
                "model is not reachable",
            ))
        }

        async fn execute(
            &self,
            _step: &CompiledStep,
            _ctx: &StepContext,
        ) -> Result<StepOutputs, HandlerFailure> {
            Ok(StepOutputs::new())
        }
    }

    fn diamond() -> Workflow {
        WorkflowBuilder::new("wf", "diamond")
            .step(StepBuilder::new("a", "transform.map").build())
            .step(StepBuilder::new("b", "transform.map").depends_on("a").build())
            .step(StepBuilder::new("c", "transform.map").depends_on("a").build())
            .step(
                StepBuilder::new("d", "transform.map")
                    .depends_on("b")
                    .depends_on("c")
                    .build(),
            )
            .build()
    }

    #[test]
    fn execution_order_respects_dependencies() {
        let result = compile_workflow(&diamond(), &HandlerRegistry::new());
        assert!(result.success);
        let plan = result.plan.unwrap();
        let position: HashMap<&str, usize> = plan
            .execution_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        assert!(position["a"] < position["b"]);
        assert!(position["a"] < position["c"]);
        assert!(position["b"] < position["d"]);
        assert!(position["c"] < position["d"]);
        assert_eq!(plan.execution_order.len(), 4);
    }

    #[test]
    fn compiled_steps_carry_implementation_versions() {
        let result = compile_workflow(&diamond(), &HandlerRegistry::new());
        let plan = result.plan.unwrap();
        for step in &plan.steps {
            assert_eq!(step.implementation_version, format!("{}@1.0.0", step.step_type));
        }
    }

    #[test]
    fn equal_step_sets_produce_equal_plan_hashes() {
        let registry = HandlerRegistry::new();
        // Document timestamps differ between the two builds, so the workflow
        // hashes differ, but the plan hash covers only the ordered steps.
        let a = compile_workflow(&diamond(), &registry).plan.unwrap();
        let b = compile_workflow(&diamond(), &registry).plan.unwrap();
        assert_eq!(a.plan_hash, b.plan_hash);
    }

    #[test]
    fn identical_documents_produce_equal_workflow_hashes() {
        let registry = HandlerRegistry::new();
        let wf = diamond();
        let a = compile_workflow(&wf, &registry).plan.unwrap();
        let b = compile_workflow(&wf, &registry).plan.unwrap();
        assert_eq!(a.workflow_hash, b.workflow_hash);
    }

    #[test]
    fn input_change_changes_plan_hash() {
        let registry = HandlerRegistry::new();
        let base = compile_workflow(&diamond(), &registry).plan.unwrap();

        let mut changed = diamond();
        changed.steps[0]
            .inputs
            .insert("k".into(), serde_json::json!("v"));
        let other = compile_workflow(&changed, &registry).plan.unwrap();
        assert_ne!(base.plan_hash, other.plan_hash);
    }

    #[test]
    fn invalid_workflow_short_circuits() {
        let wf = WorkflowBuilder::new("wf", "cyclic")
            .entry_step("s1")
            .step(StepBuilder::new("s1", "transform.map").depends_on("s2").build())
            .step(StepBuilder::new("s2", "transform.map").depends_on("s1").build())
            .build();
        let result = compile_workflow(&wf, &HandlerRegistry::new());
        assert!(!result.success);
        assert!(result.plan.is_none());
        assert!(result.errors.iter().any(|e| e.code == ErrorCode::CycleDetected));
    }

    #[test]
    fn pure_target_with_http_step_fails_compilation() {
        let wf = WorkflowBuilder::new("wf", "impure")
            .target_grade(DeterminismGrade::Pure)
            .step(StepBuilder::new("s1", "http.search").external_api().build())
            .build();
        let result = compile_workflow(&wf, &HandlerRegistry::new());
        assert!(!result.success);
        let err = result
            .errors
            .iter()
            .find(|e| e.code == ErrorCode::DeterminismViolation)
            .unwrap();
        assert_eq!(err.details["rule"], serde_json::json!("pure-no-external-api"));
    }

    #[test]
    fn contract_violations_fail_compilation() {
        let registry = HandlerRegistry::new();
        registry.register(WithContract);

        let wf = WorkflowBuilder::new("wf", "bad-inputs")
            .step(
                StepBuilder::new("s1", "transform.map")
                    .input("mode", serde_json::json!("chaotic"))
                    .build(),
            )
            .build();
        let result = compile_workflow(&wf, &registry);
        assert!(!result.success);
        let codes: Vec<ErrorCode> = result.errors.iter().map(|e| e.code).collect();
        // Missing required "expression" plus disallowed "mode" value.
        assert_eq!(codes, vec![ErrorCode::HandlerContract, ErrorCode::HandlerContract]);
        let fix = &result.errors[1].suggested_fixes[0];
        assert_eq!(
            fix.params["allowedValues"],
            serde_json::json!(["strict", "lenient"])
        );
    }

    #[test]
    fn missing_handler_is_not_a_compile_error() {
        let wf = WorkflowBuilder::new("wf", "unhandled")
            .step(StepBuilder::new("s1", "custom.unregistered").build())
            .build();
        let result = compile_workflow(&wf, &HandlerRegistry::new());
        assert!(result.success);
    }

    #[test]
    fn achievable_grade_is_recorded() {
        let wf = WorkflowBuilder::new("wf", "external")
            .step(StepBuilder::new("s1", "http.get").external_api().build())
            .build();
        let plan = compile_workflow(&wf, &HandlerRegistry::new()).plan.unwrap();
        assert_eq!(plan.determinism.target, DeterminismGrade::BestEffort);
        assert_eq!(plan.determinism.achievable, DeterminismGrade::Replayable);
        assert!(plan.determinism.satisfied);
    }

    #[tokio::test]
    async fn preflight_probes_surface_errors_without_mutating_plan() {
        let registry = HandlerRegistry::new();
        registry.register(FailsPreflight);

        let wf = WorkflowBuilder::new("wf", "probe")
            .step(StepBuilder::new("s1", "ai.complete").build())
            .build();
        let plan = compile_workflow(&wf, &registry).plan.unwrap();
        let before = plan.clone();

        let errors = validate_handlers(&plan, &registry).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].step_id.as_deref(), Some("s1"));
        assert_eq!(plan, before);
    }
}
