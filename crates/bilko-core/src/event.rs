// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle events published on the data plane.
//!
//! Events are immutable and append-only. The type set is closed; new
//! optional payload fields may be added in minor versions, but existing
//! field meanings are frozen.

use crate::Scope;
use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Schema version stamped on every event.
pub const EVENT_SCHEMA_VERSION: &str = "1.0.0";

/// The closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EventType {
    /// A run record was created.
    #[serde(rename = "run.created")]
    RunCreated,
    /// A run was accepted for execution.
    #[serde(rename = "run.queued")]
    RunQueued,
    /// A run began dispatching steps.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A run completed with every step succeeded.
    #[serde(rename = "run.succeeded")]
    RunSucceeded,
    /// A run failed terminally.
    #[serde(rename = "run.failed")]
    RunFailed,
    /// A run was canceled.
    #[serde(rename = "run.canceled")]
    RunCanceled,
    /// A step entered the pending state.
    #[serde(rename = "step.pending")]
    StepPending,
    /// A step was dispatched.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step succeeded.
    #[serde(rename = "step.succeeded")]
    StepSucceeded,
    /// A step failed terminally.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// A step was canceled.
    #[serde(rename = "step.canceled")]
    StepCanceled,
    /// An artifact was produced.
    #[serde(rename = "artifact.created")]
    ArtifactCreated,
    /// An attestation was issued.
    #[serde(rename = "attestation.issued")]
    AttestationIssued,
    /// A provenance record was persisted.
    #[serde(rename = "provenance.recorded")]
    ProvenanceRecorded,
}

impl EventType {
    /// The wire string for this type (e.g. `"run.created"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunCreated => "run.created",
            Self::RunQueued => "run.queued",
            Self::RunStarted => "run.started",
            Self::RunSucceeded => "run.succeeded",
            Self::RunFailed => "run.failed",
            Self::RunCanceled => "run.canceled",
            Self::StepPending => "step.pending",
            Self::StepStarted => "step.started",
            Self::StepSucceeded => "step.succeeded",
            Self::StepFailed => "step.failed",
            Self::StepCanceled => "step.canceled",
            Self::ArtifactCreated => "artifact.created",
            Self::AttestationIssued => "attestation.issued",
            Self::ProvenanceRecorded => "provenance.recorded",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A versioned lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Unique event identifier.
    pub id: Uuid,

    /// Event type from the closed set.
    pub event_type: EventType,

    /// Always [`EVENT_SCHEMA_VERSION`] for this crate.
    pub schema_version: String,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,

    /// Tenant scope, absent in library mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Run the event is about, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// Step the event is about, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Workflow the event is about, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Status, workflow-version, determinism-grade, and error snapshots.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl WorkflowEvent {
    /// Create an event with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            schema_version: EVENT_SCHEMA_VERSION.to_string(),
            timestamp: Utc::now(),
            scope: None,
            run_id: None,
            step_id: None,
            workflow_id: None,
            payload: BTreeMap::new(),
        }
    }

    /// Attach a tenant scope.
    #[must_use]
    pub fn scope(mut self, scope: Option<Scope>) -> Self {
        self.scope = scope;
        self
    }

    /// Attribute the event to a run.
    #[must_use]
    pub fn run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attribute the event to a step.
    #[must_use]
    pub fn step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Attribute the event to a workflow.
    #[must_use]
    pub fn workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Attach one payload entry.
    #[must_use]
    pub fn payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Attach an error snapshot to the payload.
    #[must_use]
    pub fn error_snapshot(self, error: &WorkflowError) -> Self {
        let snapshot = serde_json::to_value(error).unwrap_or(serde_json::Value::Null);
        self.payload("error", snapshot)
    }
}
