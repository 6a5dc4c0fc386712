// SPDX-License-Identifier: MIT OR Apache-2.0
//! The run executor.
//!
//! Public operations: [`Executor::create_run`], [`Executor::execute_run`],
//! [`Executor::cancel_run`], [`Executor::test_workflow`]. Within a run,
//! steps execute sequentially in topological order; distinct runs may
//! execute concurrently. Re-entry on the same run id is rejected through an
//! in-process busy set.

use crate::config::ExecutorConfig;
use crate::runner::run_step;
use bilko_compiler::compiler::{CompilationResult, compile_workflow};
use bilko_compiler::validator::validate_workflow;
use bilko_core::attestation::{
    Attestation, AttestationStatement, AttestationStatus, AttestationSubject,
    SIGNATURE_ALGORITHM, sign_statement,
};
use bilko_core::error::{ErrorCode, WorkflowError};
use bilko_core::event::{EventType, WorkflowEvent};
use bilko_core::hash::content_hash;
use bilko_core::plan::{CompiledPlan, DeterminismAnalysis};
use bilko_core::provenance::{Provenance, StepImage, TranscriptAction, TranscriptEntry};
use bilko_core::run::{Run, StepResult};
use bilko_core::state::{RunStatus, StepStatus};
use bilko_core::{Scope, Workflow};
use bilko_events::EventPublisher;
use bilko_handlers::{CancelRegistry, HandlerRegistry, StepContext};
use bilko_store::{
    AttestationStore, ProvenanceStore, RunStore, StoreError, WorkflowStore,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from executor operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A typed workflow-domain error.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A storage backend failure.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl ExecutorError {
    /// The typed error, when this is a workflow-domain failure.
    #[must_use]
    pub fn workflow_error(&self) -> Option<&WorkflowError> {
        match self {
            Self::Workflow(error) => Some(error),
            Self::Store(_) => None,
        }
    }
}

type Result<T> = std::result::Result<T, ExecutorError>;

/// Input to [`Executor::create_run`].
#[derive(Debug, Clone, Default)]
pub struct CreateRunRequest {
    /// Workflow to run.
    pub workflow_id: String,

    /// Tenant scope for the run and its lookups.
    pub scope: Option<Scope>,

    /// Pin a workflow version; latest when absent.
    pub workflow_version: Option<u64>,

    /// Run-level inputs.
    pub inputs: BTreeMap<String, serde_json::Value>,

    /// Secret values by name, checked against the document's requirements.
    pub secrets: BTreeMap<String, String>,
}

impl CreateRunRequest {
    /// A request for the latest version with no inputs or secrets.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }
}

/// Output of [`Executor::test_workflow`].
#[derive(Debug, Clone)]
pub struct TestWorkflowReport {
    /// `true` when validation found no errors.
    pub valid: bool,

    /// Whether compilation produced a plan.
    pub compilation_success: bool,

    /// Accumulated validation and compilation errors.
    pub errors: Vec<WorkflowError>,

    /// Determinism analysis, present when compilation succeeded.
    pub determinism: Option<DeterminismAnalysis>,
}

/// Drives runs through the state machine and assembles provenance.
pub struct Executor {
    workflows: Arc<dyn WorkflowStore>,
    runs: Arc<dyn RunStore>,
    provenance: Arc<dyn ProvenanceStore>,
    attestations: Arc<dyn AttestationStore>,
    publisher: Arc<EventPublisher>,
    registry: Arc<HandlerRegistry>,
    config: ExecutorConfig,
    busy: Arc<Mutex<HashSet<Uuid>>>,
    cancels: CancelRegistry,
}

/// Removes a run id from the busy set when execution leaves scope.
struct BusyGuard {
    busy: Arc<Mutex<HashSet<Uuid>>>,
    run_id: Uuid,
}

impl BusyGuard {
    fn acquire(busy: &Arc<Mutex<HashSet<Uuid>>>, run_id: Uuid) -> Option<Self> {
        let inserted = busy.lock().expect("busy set poisoned").insert(run_id);
        inserted.then(|| Self {
            busy: Arc::clone(busy),
            run_id,
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .expect("busy set poisoned")
            .remove(&self.run_id);
    }
}

impl Executor {
    /// Wire an executor over the given stores, publisher, and registry.
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runs: Arc<dyn RunStore>,
        provenance: Arc<dyn ProvenanceStore>,
        attestations: Arc<dyn AttestationStore>,
        publisher: Arc<EventPublisher>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            workflows,
            runs,
            provenance,
            attestations,
            publisher,
            registry,
            config: ExecutorConfig::default(),
            busy: Arc::new(Mutex::new(HashSet::new())),
            cancels: CancelRegistry::new(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a run for a workflow: load, check secrets, compile, persist.
    ///
    /// # Errors
    ///
    /// `VALIDATION.NOT_FOUND` when the workflow (at the requested version)
    /// does not exist, `SECRETS.MISSING` when a required secret has no
    /// value, `WORKFLOW.COMPILATION` when the document does not compile.
    pub async fn create_run(&self, request: CreateRunRequest) -> Result<Run> {
        let scope = request.scope.as_ref();
        let workflow = match request.workflow_version {
            Some(version) => {
                self.workflows
                    .get_by_id_and_version(&request.workflow_id, version, scope)
                    .await?
            }
            None => self.workflows.get_by_id(&request.workflow_id, scope).await?,
        };
        let Some(workflow) = workflow else {
            return Err(WorkflowError::new(
                ErrorCode::NotFound,
                format!("workflow '{}' not found", request.workflow_id),
            )
            .into());
        };

        let missing: Vec<&String> = workflow
            .required_secrets
            .iter()
            .filter(|name| request.secrets.get(*name).is_none_or(String::is_empty))
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::new(
                ErrorCode::SecretsMissing,
                format!("required secrets have no value: {missing:?}"),
            )
            .with_detail("missing", serde_json::json!(missing))
            .into());
        }

        let compiled = compile_workflow(&workflow, &self.registry);
        let Some(plan) = compiled.plan else {
            return Err(compilation_error(&compiled).into());
        };

        let mut run = Run::new(
            workflow.id.clone(),
            workflow.version,
            request.scope.clone(),
            request.inputs,
        );
        for step_id in &plan.execution_order {
            run.step_results.insert(step_id.clone(), StepResult::pending());
        }
        let run = self.runs.create(run).await?;

        info!(target: "bilko.executor", run = %run.id, workflow = %run.workflow_id, "run created");
        self.publish(
            WorkflowEvent::new(EventType::RunCreated)
                .scope(run.scope.clone())
                .run(run.id)
                .workflow(run.workflow_id.clone())
                .payload("status", status_json(run.status))
                .payload("workflowVersion", serde_json::json!(run.workflow_version)),
        )
        .await;

        Ok(run)
    }

    /// Execute a created run to a terminal state.
    ///
    /// # Errors
    ///
    /// `WORKFLOW.ALREADY_RUNNING` on re-entry for the same run id,
    /// `RUN.NOT_FOUND` for unknown runs, `RUN.INVALID_TRANSITION` when the
    /// run is not in a startable state. Step failures do not surface as
    /// `Err`; they terminate the run record, which is returned.
    pub async fn execute_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
        secrets: BTreeMap<String, String>,
    ) -> Result<Run> {
        let Some(_guard) = BusyGuard::acquire(&self.busy, run_id) else {
            return Err(WorkflowError::new(
                ErrorCode::AlreadyRunning,
                format!("run {run_id} is already executing"),
            )
            .with_run(run_id)
            .into());
        };

        let Some(mut run) = self.runs.get_by_id(run_id, scope).await? else {
            return Err(WorkflowError::new(
                ErrorCode::RunNotFound,
                format!("run {run_id} not found"),
            )
            .into());
        };

        run.status = run.status.transition(RunStatus::Queued).map_err(keep_run(run_id))?;
        run = self.runs.update(run).await?;
        self.publish(run_event(&run, EventType::RunQueued)).await;

        run.status = run.status.transition(RunStatus::Running).map_err(keep_run(run_id))?;
        run.started_at = Some(Utc::now());
        run = self.runs.update(run).await?;
        self.publish(run_event(&run, EventType::RunStarted)).await;

        // Sources may have changed since create; the plan is re-derived and
        // its hash recorded in provenance.
        let workflow = self
            .workflows
            .get_by_id_and_version(&run.workflow_id, run.workflow_version, scope)
            .await?;
        let Some(workflow) = workflow else {
            let error = WorkflowError::new(
                ErrorCode::NotFound,
                format!(
                    "workflow '{}' version {} no longer exists",
                    run.workflow_id, run.workflow_version
                ),
            )
            .with_run(run.id);
            return self.fail_run(run, error).await;
        };

        let compiled = compile_workflow(&workflow, &self.registry);
        let Some(plan) = compiled.plan.clone() else {
            let error = compilation_error(&compiled).with_run(run.id);
            return self.fail_run(run, error).await;
        };

        self.drive(run, &workflow, &plan, secrets).await
    }

    /// The sequential dispatch loop.
    async fn drive(
        &self,
        mut run: Run,
        workflow: &Workflow,
        plan: &CompiledPlan,
        secrets: BTreeMap<String, String>,
    ) -> Result<Run> {
        let mut upstream: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
        let mut transcript: Vec<TranscriptEntry> = Vec::new();
        let mut output_hashes: BTreeMap<String, String> = BTreeMap::new();

        for step_id in &plan.execution_order {
            if self.cancels.is_requested(run.id) {
                return self.finish_canceled(run).await;
            }

            let Some(step) = plan.step(step_id) else {
                // Execution order and step list are built together; a miss
                // here is a compiler defect.
                let error = WorkflowError::new(
                    ErrorCode::Compilation,
                    format!("plan has no compiled step '{step_id}'"),
                )
                .with_run(run.id);
                return self.fail_run(run, error).await;
            };

            let deps_succeeded = step.depends_on.iter().all(|dep| {
                run.step_results
                    .get(dep)
                    .is_some_and(|r| r.status == StepStatus::Succeeded)
            });
            if !deps_succeeded {
                mark_step(&mut run, step_id, |result| {
                    result.status = StepStatus::Canceled;
                    result.completed_at = Some(Utc::now());
                });
                transcript.push(entry(step_id, TranscriptAction::Canceled));
                run = self.runs.update(run).await?;
                self.publish(step_event(&run, step_id, EventType::StepCanceled)).await;
                continue;
            }

            let running = run
                .step_results
                .get(step_id)
                .map_or(StepStatus::Pending, |r| r.status)
                .transition(StepStatus::Running)
                .map_err(keep_run(run.id))?;
            mark_step(&mut run, step_id, |result| {
                result.status = running;
                result.started_at = Some(Utc::now());
            });
            let mut started = entry(step_id, TranscriptAction::Started);
            started.policies_applied = Some(step.policy.clone());
            transcript.push(started);
            run = self.runs.update(run).await?;
            self.publish(step_event(&run, step_id, EventType::StepStarted)).await;

            let mut ctx = StepContext::new(run.id, workflow.id.clone(), self.cancels.probe(run.id));
            ctx.secrets = secrets.clone();
            ctx.upstream_outputs = upstream.clone();

            let outcome = run_step(step, &ctx, &self.registry).await;
            for _ in 1..outcome.attempts {
                transcript.push(entry(step_id, TranscriptAction::Retried));
            }

            match outcome.status {
                StepStatus::Succeeded => {
                    let output_hash = self.hash_value(&outcome.outputs, run.id)?;
                    output_hashes.insert(step_id.clone(), output_hash.hex.clone());
                    upstream.insert(step_id.clone(), outcome.outputs.clone());
                    mark_step(&mut run, step_id, |result| {
                        result.status = StepStatus::Succeeded;
                        result.outputs = outcome.outputs.clone();
                        result.attempts = outcome.attempts;
                        result.duration_ms = Some(outcome.duration_ms);
                        result.completed_at = Some(Utc::now());
                    });
                    let mut completed = entry(step_id, TranscriptAction::Completed);
                    completed.duration_ms = Some(outcome.duration_ms);
                    completed.output_hash = Some(output_hash.hex);
                    transcript.push(completed);
                    run = self.runs.update(run).await?;
                    self.publish(step_event(&run, step_id, EventType::StepSucceeded)).await;
                }

                StepStatus::Failed => {
                    let error = outcome.error.clone().unwrap_or_else(|| {
                        WorkflowError::new(
                            ErrorCode::UnknownFailure,
                            format!("step '{step_id}' failed without a captured error"),
                        )
                        .with_step(step_id.clone())
                    });
                    mark_step(&mut run, step_id, |result| {
                        result.status = StepStatus::Failed;
                        result.error = Some(error.clone());
                        result.attempts = outcome.attempts;
                        result.duration_ms = Some(outcome.duration_ms);
                        result.completed_at = Some(Utc::now());
                    });
                    let mut failed = entry(step_id, TranscriptAction::Failed);
                    failed.duration_ms = Some(outcome.duration_ms);
                    transcript.push(failed);
                    run = self.runs.update(run).await?;
                    self.publish(
                        step_event(&run, step_id, EventType::StepFailed).error_snapshot(&error),
                    )
                    .await;
                    let run_id = run.id;
                    return self.fail_run(run, error.with_run(run_id)).await;
                }

                StepStatus::Canceled => {
                    mark_step(&mut run, step_id, |result| {
                        result.status = StepStatus::Canceled;
                        result.attempts = outcome.attempts;
                        result.completed_at = Some(Utc::now());
                    });
                    transcript.push(entry(step_id, TranscriptAction::Canceled));
                    self.publish(step_event(&run, step_id, EventType::StepCanceled)).await;
                    return self.finish_canceled(run).await;
                }

                StepStatus::Pending | StepStatus::Running => {
                    // run_step only returns terminal statuses.
                    let error = WorkflowError::new(
                        ErrorCode::UnknownFailure,
                        format!("step '{step_id}' returned a non-terminal status"),
                    )
                    .with_step(step_id.clone());
                    return self.fail_run(run, error).await;
                }
            }
        }

        run.status = run.status.transition(RunStatus::Succeeded).map_err(keep_run(run.id))?;
        run.determinism_grade = Some(plan.achievable_grade());
        run.completed_at = Some(Utc::now());
        run = self.runs.update(run).await?;
        self.cancels.clear(run.id);
        info!(target: "bilko.executor", run = %run.id, "run succeeded");
        self.publish(
            run_event(&run, EventType::RunSucceeded).payload(
                "determinismGrade",
                serde_json::to_value(plan.achievable_grade()).unwrap_or(serde_json::Value::Null),
            ),
        )
        .await;

        run = self
            .record_provenance(run, plan, output_hashes, transcript)
            .await?;
        Ok(run)
    }

    /// Persist provenance and, when configured, the attestation.
    async fn record_provenance(
        &self,
        mut run: Run,
        plan: &CompiledPlan,
        output_hashes: BTreeMap<String, String>,
        transcript: Vec<TranscriptEntry>,
    ) -> Result<Run> {
        let step_images: Vec<StepImage> = plan
            .steps
            .iter()
            .map(|s| StepImage::new(s.id.clone(), s.implementation_version.clone()))
            .collect();

        let provenance = Provenance {
            id: Uuid::new_v4(),
            run_id: run.id,
            workflow_id: run.workflow_id.clone(),
            workflow_version: run.workflow_version,
            scope: run.scope.clone(),
            created_at: Utc::now(),
            determinism_grade: plan.achievable_grade(),
            workflow_hash: plan.workflow_hash.clone(),
            plan_hash: plan.plan_hash.clone(),
            input_hashes: output_hashes,
            step_images: step_images.clone(),
            transcript,
        };
        let provenance = self.provenance.create(provenance).await?;
        run.provenance_id = Some(provenance.id);
        self.publish(
            WorkflowEvent::new(EventType::ProvenanceRecorded)
                .scope(run.scope.clone())
                .run(run.id)
                .workflow(run.workflow_id.clone())
                .payload("provenanceId", serde_json::json!(provenance.id)),
        )
        .await;

        if self.config.generate_attestations {
            let attestation = self.issue_attestation(&run, plan, &provenance, &step_images)?;
            let attestation = self.attestations.create(attestation).await?;
            run.attestation_id = Some(attestation.id);
            self.publish(
                WorkflowEvent::new(EventType::AttestationIssued)
                    .scope(run.scope.clone())
                    .run(run.id)
                    .workflow(run.workflow_id.clone())
                    .payload("attestationId", serde_json::json!(attestation.id)),
            )
            .await;
        }

        let run = self.runs.update(run).await?;
        Ok(run)
    }

    fn issue_attestation(
        &self,
        run: &Run,
        plan: &CompiledPlan,
        provenance: &Provenance,
        step_images: &[StepImage],
    ) -> Result<Attestation> {
        let mut step_input_hashes = BTreeMap::new();
        for step in &plan.steps {
            let hash = self.hash_value(&step.inputs, run.id)?;
            step_input_hashes.insert(step.id.clone(), hash.hex);
        }
        let step_image_digests: BTreeMap<String, String> = step_images
            .iter()
            .map(|i| (i.step_id.clone(), i.image_digest.clone()))
            .collect();

        let statement = AttestationStatement {
            workflow_hash: plan.workflow_hash.clone(),
            step_input_hashes,
            step_image_digests,
            artifact_hashes: Vec::new(),
            determinism_grade: plan.achievable_grade(),
        };

        let (key, key_ref) = self.config.resolve_signing_key(run.scope.as_ref());
        let signature = sign_statement(&key, &statement).map_err(|err| {
            ExecutorError::Workflow(
                WorkflowError::new(
                    ErrorCode::UnknownFailure,
                    format!("attestation statement could not be canonicalized: {err}"),
                )
                .with_run(run.id),
            )
        })?;

        Ok(Attestation {
            id: Uuid::new_v4(),
            run_id: run.id,
            subject: AttestationSubject {
                run_id: run.id,
                workflow_id: run.workflow_id.clone(),
                workflow_version: run.workflow_version,
                provenance_id: provenance.id,
            },
            status: AttestationStatus::Issued,
            statement,
            signature_algorithm: SIGNATURE_ALGORITHM.to_string(),
            signature,
            verification_key_ref: key_ref,
            scope: run.scope.clone(),
            issued_at: Utc::now(),
        })
    }

    /// Request cancellation of a run.
    ///
    /// A running run observes the request at its next check point; any other
    /// non-terminal run is transitioned synchronously.
    ///
    /// # Errors
    ///
    /// `RUN.NOT_FOUND` for unknown runs; `RUN.INVALID_TRANSITION` when the
    /// run is already terminal.
    pub async fn cancel_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
        canceled_by: impl Into<String>,
        reason: Option<String>,
    ) -> Result<Run> {
        let Some(mut run) = self.runs.get_by_id(run_id, scope).await? else {
            return Err(WorkflowError::new(
                ErrorCode::RunNotFound,
                format!("run {run_id} not found"),
            )
            .into());
        };

        run.canceled_by = Some(canceled_by.into());
        run.cancel_reason = reason;

        if run.status == RunStatus::Running {
            // The execution loop picks the signal up between steps or
            // between retry attempts.
            self.cancels.request(run_id);
            let run = self.runs.update(run).await?;
            debug!(target: "bilko.executor", run = %run_id, "cancellation requested");
            return Ok(run);
        }

        run.status = run.status.transition(RunStatus::Canceled).map_err(keep_run(run_id))?;
        run.completed_at = Some(Utc::now());
        cancel_pending_steps(&mut run);
        let run = self.runs.update(run).await?;
        self.cancels.clear(run_id);
        self.publish(run_event(&run, EventType::RunCanceled)).await;
        Ok(run)
    }

    /// Compile-only check of a workflow document.
    #[must_use]
    pub fn test_workflow(&self, workflow: &Workflow, _scope: Option<&Scope>) -> TestWorkflowReport {
        let validation = validate_workflow(workflow);
        let compiled = compile_workflow(workflow, &self.registry);
        TestWorkflowReport {
            valid: validation.valid,
            compilation_success: compiled.success,
            determinism: compiled.plan.map(|p| p.determinism),
            errors: compiled.errors,
        }
    }

    /// Terminate a run as `Failed` with the given error.
    async fn fail_run(&self, mut run: Run, error: WorkflowError) -> Result<Run> {
        run.status = run.status.transition(RunStatus::Failed).map_err(keep_run(run.id))?;
        run.error = Some(error.clone());
        run.completed_at = Some(Utc::now());
        let run = self.runs.update(run).await?;
        self.cancels.clear(run.id);
        warn!(target: "bilko.executor", run = %run.id, code = error.code.code(), "run failed");
        self.publish(run_event(&run, EventType::RunFailed).error_snapshot(&error)).await;
        Ok(run)
    }

    /// Terminate a run as `Canceled`, cancelling all non-terminal steps.
    async fn finish_canceled(&self, mut run: Run) -> Result<Run> {
        run.status = run.status.transition(RunStatus::Canceled).map_err(keep_run(run.id))?;
        run.completed_at = Some(Utc::now());
        let canceled_steps = cancel_pending_steps(&mut run);
        let run = self.runs.update(run).await?;
        self.cancels.clear(run.id);
        info!(target: "bilko.executor", run = %run.id, "run canceled");
        for step_id in canceled_steps {
            self.publish(step_event(&run, &step_id, EventType::StepCanceled)).await;
        }
        self.publish(run_event(&run, EventType::RunCanceled)).await;
        Ok(run)
    }

    fn hash_value<T: serde::Serialize>(
        &self,
        value: &T,
        run_id: Uuid,
    ) -> Result<bilko_core::hash::ContentHash> {
        content_hash(value).map_err(|err| {
            ExecutorError::Workflow(
                WorkflowError::new(
                    ErrorCode::UnknownFailure,
                    format!("value could not be canonicalized: {err}"),
                )
                .with_run(run_id),
            )
        })
    }

    /// Publish behind the failure-isolating boundary: a publish failure is
    /// logged and swallowed, never surfaced into the run.
    async fn publish(&self, event: WorkflowEvent) {
        if let Err(err) = self.publisher.publish_event(event).await {
            warn!(
                target: "bilko.executor",
                error = %err,
                "event publish failed; run continues"
            );
        }
    }
}

fn compilation_error(result: &CompilationResult) -> WorkflowError {
    WorkflowError::new(ErrorCode::Compilation, "workflow failed to compile").with_detail(
        "errors",
        serde_json::to_value(&result.errors).unwrap_or(serde_json::Value::Null),
    )
}

/// Attribute a state-machine error to the run before surfacing it.
fn keep_run(run_id: Uuid) -> impl FnOnce(WorkflowError) -> WorkflowError {
    move |error| error.with_run(run_id)
}

fn mark_step(run: &mut Run, step_id: &str, update: impl FnOnce(&mut StepResult)) {
    if let Some(result) = run.step_results.get_mut(step_id) {
        update(result);
    }
}

/// Cancel every non-terminal step result, returning the affected ids.
fn cancel_pending_steps(run: &mut Run) -> Vec<String> {
    let mut canceled = Vec::new();
    for (step_id, result) in &mut run.step_results {
        if !result.status.is_terminal() {
            result.status = StepStatus::Canceled;
            result.completed_at = Some(Utc::now());
            canceled.push(step_id.clone());
        }
    }
    canceled
}

fn entry(step_id: &str, action: TranscriptAction) -> TranscriptEntry {
    TranscriptEntry {
        step_id: step_id.to_string(),
        timestamp: Utc::now(),
        action,
        duration_ms: None,
        output_hash: None,
        policies_applied: None,
    }
}

fn status_json(status: RunStatus) -> serde_json::Value {
    serde_json::to_value(status).unwrap_or(serde_json::Value::Null)
}

fn run_event(run: &Run, event_type: EventType) -> WorkflowEvent {
    WorkflowEvent::new(event_type)
        .scope(run.scope.clone())
        .run(run.id)
        .workflow(run.workflow_id.clone())
        .payload("status", status_json(run.status))
        .payload("workflowVersion", serde_json::json!(run.workflow_version))
}

fn step_event(run: &Run, step_id: &str, event_type: EventType) -> WorkflowEvent {
    let status = run
        .step_results
        .get(step_id)
        .map(|r| serde_json::to_value(r.status).unwrap_or(serde_json::Value::Null))
        .unwrap_or(serde_json::Value::Null);
    WorkflowEvent::new(event_type)
        .scope(run.scope.clone())
        .run(run.id)
        .workflow(run.workflow_id.clone())
        .step(step_id)
        .payload("status", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bilko_core::plan::CompiledStep;
    use bilko_core::{StepBuilder, WorkflowBuilder};
    use bilko_handlers::{HandlerFailure, StepHandler, StepOutputs};
    use bilko_store::{
        MemoryAttestationStore, MemoryEventStore, MemoryProvenanceStore, MemoryRunStore,
        MemoryWorkflowStore,
    };

    struct Echo;

    #[async_trait]
    impl StepHandler for Echo {
        fn step_type(&self) -> &str {
            "transform.map"
        }

        async fn execute(
            &self,
            _step: &CompiledStep,
            _ctx: &StepContext,
        ) -> std::result::Result<StepOutputs, HandlerFailure> {
            Ok(BTreeMap::from([("value".to_string(), serde_json::json!(42))]))
        }
    }

    fn executor() -> (Executor, Arc<MemoryWorkflowStore>) {
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(Echo);
        let executor = Executor::new(
            Arc::clone(&workflows) as Arc<dyn WorkflowStore>,
            Arc::new(MemoryRunStore::new()),
            Arc::new(MemoryProvenanceStore::new()),
            Arc::new(MemoryAttestationStore::new()),
            Arc::new(EventPublisher::new(Arc::new(MemoryEventStore::new()))),
            registry,
        );
        (executor, workflows)
    }

    fn single_step_workflow(id: &str) -> Workflow {
        WorkflowBuilder::new(id, "single")
            .step(StepBuilder::new("s1", "transform.map").build())
            .build()
    }

    #[tokio::test]
    async fn create_run_rejects_unknown_workflow() {
        let (executor, _) = executor();
        let err = executor
            .create_run(CreateRunRequest::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.workflow_error().unwrap().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn create_run_rejects_missing_secrets() {
        let (executor, workflows) = executor();
        let wf = WorkflowBuilder::new("wf", "secretive")
            .require_secret("API_KEY")
            .step(StepBuilder::new("s1", "transform.map").build())
            .build();
        workflows.create(wf).await.unwrap();

        let err = executor
            .create_run(CreateRunRequest::new("wf"))
            .await
            .unwrap_err();
        let error = err.workflow_error().unwrap();
        assert_eq!(error.code, ErrorCode::SecretsMissing);
        assert_eq!(error.details["missing"], serde_json::json!(["API_KEY"]));
    }

    #[tokio::test]
    async fn create_run_prepopulates_pending_steps() {
        let (executor, workflows) = executor();
        workflows.create(single_step_workflow("wf")).await.unwrap();
        let run = executor.create_run(CreateRunRequest::new("wf")).await.unwrap();
        assert_eq!(run.status, RunStatus::Created);
        assert_eq!(run.step_results["s1"].status, StepStatus::Pending);
        assert_eq!(run.step_results["s1"].attempts, 0);
    }

    #[tokio::test]
    async fn execute_run_rejects_reentry() {
        let (executor, workflows) = executor();
        workflows.create(single_step_workflow("wf")).await.unwrap();
        let run = executor.create_run(CreateRunRequest::new("wf")).await.unwrap();

        // Simulate a concurrent executor holding the busy slot.
        let _slot = BusyGuard::acquire(&executor.busy, run.id).unwrap();
        let err = executor
            .execute_run(run.id, None, BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.workflow_error().unwrap().code, ErrorCode::AlreadyRunning);
    }

    #[tokio::test]
    async fn busy_slot_frees_after_execution() {
        let (executor, workflows) = executor();
        workflows.create(single_step_workflow("wf")).await.unwrap();
        let run = executor.create_run(CreateRunRequest::new("wf")).await.unwrap();

        executor.execute_run(run.id, None, BTreeMap::new()).await.unwrap();
        assert!(executor.busy.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_of_created_run_is_synchronous() {
        let (executor, workflows) = executor();
        workflows.create(single_step_workflow("wf")).await.unwrap();
        let run = executor.create_run(CreateRunRequest::new("wf")).await.unwrap();

        let canceled = executor
            .cancel_run(run.id, None, "ops", Some("window closed".into()))
            .await
            .unwrap();
        assert_eq!(canceled.status, RunStatus::Canceled);
        assert_eq!(canceled.canceled_by.as_deref(), Some("ops"));
        assert_eq!(canceled.cancel_reason.as_deref(), Some("window closed"));
        assert_eq!(canceled.step_results["s1"].status, StepStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_of_terminal_run_is_rejected() {
        let (executor, workflows) = executor();
        workflows.create(single_step_workflow("wf")).await.unwrap();
        let run = executor.create_run(CreateRunRequest::new("wf")).await.unwrap();
        executor.execute_run(run.id, None, BTreeMap::new()).await.unwrap();

        let err = executor
            .cancel_run(run.id, None, "ops", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.workflow_error().unwrap().code,
            ErrorCode::RunInvalidTransition
        );
    }

    #[tokio::test]
    async fn test_workflow_reports_determinism() {
        let (executor, _) = executor();
        let report = executor.test_workflow(&single_step_workflow("wf"), None);
        assert!(report.valid);
        assert!(report.compilation_success);
        assert!(report.determinism.unwrap().satisfied);
    }
}
