// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store trait contracts.
//!
//! The core issues one logical operation at a time per run; stores provide
//! their own consistency. Every lookup takes an optional [`Scope`]; `None`
//! means library mode and skips tenant filtering. Implementations MUST
//! return deep copies on read and persist deep copies on write.

use async_trait::async_trait;
use bilko_core::attestation::Attestation;
use bilko_core::event::{EventType, WorkflowEvent};
use bilko_core::provenance::Provenance;
use bilko_core::run::Run;
use bilko_core::{Scope, Workflow};
use uuid::Uuid;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same key already exists.
    #[error("record already exists: {0}")]
    Duplicate(String),

    /// The record to update does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend failed to serialize or persist the record.
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for workflow documents.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a new document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the id is already taken.
    async fn create(&self, workflow: Workflow) -> StoreResult<Workflow>;

    /// Fetch the latest version of a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_id(&self, id: &str, scope: Option<&Scope>) -> StoreResult<Option<Workflow>>;

    /// Fetch a pinned version of a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_id_and_version(
        &self,
        id: &str,
        version: u64,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Workflow>>;

    /// Persist an updated document and index it by `(id, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no document with the id exists.
    async fn update(&self, workflow: Workflow) -> StoreResult<Workflow>;

    /// List the latest version of every visible document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn list(&self, scope: Option<&Scope>) -> StoreResult<Vec<Workflow>>;
}

/// Persistence for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the run id is already taken.
    async fn create(&self, run: Run) -> StoreResult<Run>;

    /// Fetch a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Run>>;

    /// Write back a run after a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    async fn update(&self, run: Run) -> StoreResult<Run>;

    /// List runs of one workflow, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn list_by_workflow(
        &self,
        workflow_id: &str,
        scope: Option<&Scope>,
    ) -> StoreResult<Vec<Run>>;
}

/// Append-only persistence for lifecycle events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event. Events are immutable once appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn append(&self, event: WorkflowEvent) -> StoreResult<WorkflowEvent>;

    /// Events about one run, in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn list_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Vec<WorkflowEvent>>;

    /// Events visible under a scope, optionally narrowed by type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn list_by_scope(
        &self,
        scope: &Scope,
        types: Option<&[EventType]>,
    ) -> StoreResult<Vec<WorkflowEvent>>;
}

/// Persistence for provenance records.
#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    /// Persist a provenance record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the id is already taken.
    async fn create(&self, provenance: Provenance) -> StoreResult<Provenance>;

    /// Fetch by provenance id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Provenance>>;

    /// Fetch the provenance of one run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Provenance>>;
}

/// Persistence for attestations.
#[async_trait]
pub trait AttestationStore: Send + Sync {
    /// Persist an attestation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the id is already taken.
    async fn create(&self, attestation: Attestation) -> StoreResult<Attestation>;

    /// Fetch by attestation id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Attestation>>;

    /// Fetch the attestation of one run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn get_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Attestation>>;
}
