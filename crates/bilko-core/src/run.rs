// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run records and per-step results.

use crate::error::WorkflowError;
use crate::{DeterminismGrade, Scope};
use crate::state::{RunStatus, StepStatus};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Result of one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Current step status.
    pub status: StepStatus,

    /// When the step was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Handler outputs on success.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// Captured error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,

    /// Handler invocations consumed. Zero when the step was never dispatched.
    pub attempts: u32,

    /// Wall-clock duration of the successful or final attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepResult {
    /// A fresh pending result with no attempts recorded.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            outputs: BTreeMap::new(),
            error: None,
            attempts: 0,
            duration_ms: None,
        }
    }
}

/// A single execution of a workflow at a pinned version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Unique run identifier.
    pub id: Uuid,

    /// Source workflow id.
    pub workflow_id: String,

    /// Workflow version this run executes.
    pub workflow_version: u64,

    /// Tenant scope, absent in library mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Current run status.
    pub status: RunStatus,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last write-back timestamp.
    pub updated_at: DateTime<Utc>,

    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-step results keyed by step id, pre-populated in execution order.
    pub step_results: BTreeMap<String, StepResult>,

    /// Run-level inputs supplied at creation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, serde_json::Value>,

    /// Run-level error when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,

    /// Determinism grade achieved, assigned when the run succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determinism_grade: Option<DeterminismGrade>,

    /// Provenance record produced on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_id: Option<Uuid>,

    /// Attestation record produced on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_id: Option<Uuid>,

    /// Who requested cancellation, when canceled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_by: Option<String>,

    /// Why cancellation was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Run {
    /// Create a fresh run record in [`RunStatus::Created`].
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_version: u64,
        scope: Option<Scope>,
        inputs: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            workflow_version,
            scope,
            status: RunStatus::Created,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            step_results: BTreeMap::new(),
            inputs,
            error: None,
            determinism_grade: None,
            provenance_id: None,
            attestation_id: None,
            canceled_by: None,
            cancel_reason: None,
        }
    }

    /// Returns `true` when the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
