// SPDX-License-Identifier: MIT OR Apache-2.0
//! bilko-flow
//!
//! Deterministic workflows: a DSL compiler, a sequential executor with
//! retry/timeout/cancellation, a versioned event publisher, provenance and
//! HMAC-signed attestations, and a planner protocol for untrusted
//! (LLM-backed) workflow authors.
//!
//! This crate is the stable entry surface; the pieces live in the
//! `bilko-*` member crates and are re-exported here.
//!
//! # Examples
//!
//! ```
//! use bilko_flow::{StepBuilder, WorkflowBuilder, validate_workflow};
//!
//! let wf = WorkflowBuilder::new("wf-hello", "Hello")
//!     .step(StepBuilder::new("s1", "transform.map").build())
//!     .build();
//! assert!(validate_workflow(&wf).valid);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use bilko_core::{
    BackoffStrategy, DeterminismGrade, EvidenceCapture, ExternalDependency, Scope, Step,
    StepBuilder, StepDeterminism, StepPolicy, SUPPORTED_SPEC_VERSIONS, Workflow, WorkflowBuilder,
    WorkflowDeterminism, WorkflowStatus,
};

pub use bilko_core::attestation::{Attestation, AttestationStatement, verify_signature};
pub use bilko_core::error::{ErrorCode, SuggestedFix, WorkflowError, mask_secrets};
pub use bilko_core::event::{EVENT_SCHEMA_VERSION, EventType, WorkflowEvent};
pub use bilko_core::hash::{ContentHash, canonical_json, content_hash, sha256_hex};
pub use bilko_core::plan::{CompiledPlan, CompiledStep, DeterminismAnalysis};
pub use bilko_core::provenance::{Provenance, TranscriptAction, TranscriptEntry};
pub use bilko_core::run::{Run, StepResult};
pub use bilko_core::state::{RunStatus, StepStatus};

pub use bilko_handlers::{
    CancelProbe, ContractField, FieldType, HandlerFailure, HandlerRegistry, InputContract,
    StepContext, StepHandler, StepOutputs, get_step_handler, register_step_handler,
    registered_handlers,
};

pub use bilko_store::{
    AttestationStore, EventStore, MemoryAttestationStore, MemoryEventStore,
    MemoryProvenanceStore, MemoryRunStore, MemoryWorkflowStore, ProvenanceStore, RunStore,
    StoreError, WorkflowStore,
};

pub use bilko_events::{EventPublisher, Subscription, SubscriptionGuard};

pub use bilko_compiler::{
    CompilationResult, ValidationResult, validate_handlers, validate_workflow,
};

pub use bilko_runtime::{
    ATTESTATION_KEY_ENV, CreateRunRequest, Executor, ExecutorConfig, ExecutorError,
    TestWorkflowReport, compute_backoff,
};

pub use bilko_planner::{
    CertificationReport, Planner, PlannerVersionInfo, RepairRequest, ScriptedPlanner,
    WorkflowPatch, WorkflowProposal, apply_patch, certify_planner, validate_patch,
    validate_proposal,
};

/// Compile a workflow against the process-wide handler registry.
///
/// Embedders that isolate their own registries should call
/// [`bilko_compiler::compiler::compile_workflow`] with an explicit handle.
#[must_use]
pub fn compile_workflow(workflow: &Workflow) -> CompilationResult {
    bilko_compiler::compiler::compile_workflow(workflow, &bilko_handlers::global_registry())
}
