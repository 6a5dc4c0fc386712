// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory reference implementations.
//!
//! All records are owned data, so `Clone` is a structural deep copy: reads
//! hand out clones and writes store clones, which is exactly the isolation
//! the contracts require. Locks are never held across awaits.

use crate::contract::{
    AttestationStore, EventStore, ProvenanceStore, RunStore, StoreError, StoreResult,
    WorkflowStore,
};
use async_trait::async_trait;
use bilko_core::attestation::Attestation;
use bilko_core::event::{EventType, WorkflowEvent};
use bilko_core::provenance::Provenance;
use bilko_core::run::Run;
use bilko_core::{Scope, Workflow, scope_matches};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory [`WorkflowStore`] with a latest index and a version index.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    latest: RwLock<HashMap<String, Workflow>>,
    versions: RwLock<HashMap<(String, u64), Workflow>>,
}

impl MemoryWorkflowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create(&self, workflow: Workflow) -> StoreResult<Workflow> {
        let mut latest = self.latest.write().expect("workflow store poisoned");
        if latest.contains_key(&workflow.id) {
            return Err(StoreError::Duplicate(workflow.id));
        }
        latest.insert(workflow.id.clone(), workflow.clone());
        self.versions
            .write()
            .expect("workflow store poisoned")
            .insert((workflow.id.clone(), workflow.version), workflow.clone());
        Ok(workflow)
    }

    async fn get_by_id(&self, id: &str, scope: Option<&Scope>) -> StoreResult<Option<Workflow>> {
        let latest = self.latest.read().expect("workflow store poisoned");
        Ok(latest
            .get(id)
            .filter(|wf| scope_matches(wf.scope.as_ref(), scope))
            .cloned())
    }

    async fn get_by_id_and_version(
        &self,
        id: &str,
        version: u64,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Workflow>> {
        let versions = self.versions.read().expect("workflow store poisoned");
        Ok(versions
            .get(&(id.to_string(), version))
            .filter(|wf| scope_matches(wf.scope.as_ref(), scope))
            .cloned())
    }

    async fn update(&self, workflow: Workflow) -> StoreResult<Workflow> {
        let mut updated = workflow;
        updated.updated_at = Utc::now();
        let mut latest = self.latest.write().expect("workflow store poisoned");
        if !latest.contains_key(&updated.id) {
            return Err(StoreError::NotFound(updated.id));
        }
        latest.insert(updated.id.clone(), updated.clone());
        self.versions
            .write()
            .expect("workflow store poisoned")
            .insert((updated.id.clone(), updated.version), updated.clone());
        Ok(updated)
    }

    async fn list(&self, scope: Option<&Scope>) -> StoreResult<Vec<Workflow>> {
        let latest = self.latest.read().expect("workflow store poisoned");
        let mut workflows: Vec<Workflow> = latest
            .values()
            .filter(|wf| scope_matches(wf.scope.as_ref(), scope))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workflows)
    }
}

/// In-memory [`RunStore`].
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: Run) -> StoreResult<Run> {
        let mut runs = self.runs.write().expect("run store poisoned");
        if runs.contains_key(&run.id) {
            return Err(StoreError::Duplicate(run.id.to_string()));
        }
        runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Run>> {
        let runs = self.runs.read().expect("run store poisoned");
        Ok(runs
            .get(&id)
            .filter(|run| scope_matches(run.scope.as_ref(), scope))
            .cloned())
    }

    async fn update(&self, run: Run) -> StoreResult<Run> {
        let mut updated = run;
        updated.updated_at = Utc::now();
        let mut runs = self.runs.write().expect("run store poisoned");
        if !runs.contains_key(&updated.id) {
            return Err(StoreError::NotFound(updated.id.to_string()));
        }
        runs.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list_by_workflow(
        &self,
        workflow_id: &str,
        scope: Option<&Scope>,
    ) -> StoreResult<Vec<Run>> {
        let runs = self.runs.read().expect("run store poisoned");
        let mut matching: Vec<Run> = runs
            .values()
            .filter(|run| run.workflow_id == workflow_id)
            .filter(|run| scope_matches(run.scope.as_ref(), scope))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

/// In-memory append-only [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<WorkflowEvent>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of appended events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().expect("event store poisoned").len()
    }

    /// Returns `true` when no events have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: WorkflowEvent) -> StoreResult<WorkflowEvent> {
        self.events
            .write()
            .expect("event store poisoned")
            .push(event.clone());
        Ok(event)
    }

    async fn list_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        let events = self.events.read().expect("event store poisoned");
        Ok(events
            .iter()
            .filter(|e| e.run_id == Some(run_id))
            .filter(|e| scope_matches(e.scope.as_ref(), scope))
            .cloned()
            .collect())
    }

    async fn list_by_scope(
        &self,
        scope: &Scope,
        types: Option<&[EventType]>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        let events = self.events.read().expect("event store poisoned");
        Ok(events
            .iter()
            .filter(|e| scope_matches(e.scope.as_ref(), Some(scope)))
            .filter(|e| types.is_none_or(|set| set.contains(&e.event_type)))
            .cloned()
            .collect())
    }
}

/// In-memory [`ProvenanceStore`].
#[derive(Debug, Default)]
pub struct MemoryProvenanceStore {
    records: RwLock<HashMap<Uuid, Provenance>>,
}

impl MemoryProvenanceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProvenanceStore for MemoryProvenanceStore {
    async fn create(&self, provenance: Provenance) -> StoreResult<Provenance> {
        let mut records = self.records.write().expect("provenance store poisoned");
        if records.contains_key(&provenance.id) {
            return Err(StoreError::Duplicate(provenance.id.to_string()));
        }
        records.insert(provenance.id, provenance.clone());
        Ok(provenance)
    }

    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Provenance>> {
        let records = self.records.read().expect("provenance store poisoned");
        Ok(records
            .get(&id)
            .filter(|p| scope_matches(p.scope.as_ref(), scope))
            .cloned())
    }

    async fn get_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Provenance>> {
        let records = self.records.read().expect("provenance store poisoned");
        Ok(records
            .values()
            .find(|p| p.run_id == run_id && scope_matches(p.scope.as_ref(), scope))
            .cloned())
    }
}

/// In-memory [`AttestationStore`].
#[derive(Debug, Default)]
pub struct MemoryAttestationStore {
    records: RwLock<HashMap<Uuid, Attestation>>,
}

impl MemoryAttestationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttestationStore for MemoryAttestationStore {
    async fn create(&self, attestation: Attestation) -> StoreResult<Attestation> {
        let mut records = self.records.write().expect("attestation store poisoned");
        if records.contains_key(&attestation.id) {
            return Err(StoreError::Duplicate(attestation.id.to_string()));
        }
        records.insert(attestation.id, attestation.clone());
        Ok(attestation)
    }

    async fn get_by_id(&self, id: Uuid, scope: Option<&Scope>) -> StoreResult<Option<Attestation>> {
        let records = self.records.read().expect("attestation store poisoned");
        Ok(records
            .get(&id)
            .filter(|a| scope_matches(a.scope.as_ref(), scope))
            .cloned())
    }

    async fn get_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Option<Attestation>> {
        let records = self.records.read().expect("attestation store poisoned");
        Ok(records
            .values()
            .find(|a| a.run_id == run_id && scope_matches(a.scope.as_ref(), scope))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bilko_core::event::EventType;
    use bilko_core::{StepBuilder, WorkflowBuilder};
    use std::collections::BTreeMap;

    fn workflow(id: &str) -> Workflow {
        WorkflowBuilder::new(id, "test")
            .step(StepBuilder::new("s1", "transform.map").build())
            .build()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_workflow_ids() {
        let store = MemoryWorkflowStore::new();
        store.create(workflow("wf")).await.unwrap();
        assert!(matches!(
            store.create(workflow("wf")).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn update_indexes_by_version() {
        let store = MemoryWorkflowStore::new();
        store.create(workflow("wf")).await.unwrap();

        let mut v2 = workflow("wf");
        v2.version = 2;
        store.update(v2).await.unwrap();

        let latest = store.get_by_id("wf", None).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        let v1 = store.get_by_id_and_version("wf", 1, None).await.unwrap().unwrap();
        assert_eq!(v1.version, 1);
    }

    #[tokio::test]
    async fn reads_are_deep_copies() {
        let store = MemoryWorkflowStore::new();
        store.create(workflow("wf")).await.unwrap();

        let mut fetched = store.get_by_id("wf", None).await.unwrap().unwrap();
        fetched.name = "mutated".into();
        fetched.steps.clear();

        let again = store.get_by_id("wf", None).await.unwrap().unwrap();
        assert_eq!(again.name, "test");
        assert_eq!(again.steps.len(), 1);
    }

    #[tokio::test]
    async fn scope_filters_lookups() {
        let store = MemoryWorkflowStore::new();
        let mut wf = workflow("wf");
        wf.scope = Some(Scope::new("tenant-a"));
        store.create(wf).await.unwrap();

        assert!(store.get_by_id("wf", None).await.unwrap().is_some());
        assert!(
            store
                .get_by_id("wf", Some(&Scope::new("tenant-a")))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_by_id("wf", Some(&Scope::new("tenant-b")))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn events_preserve_append_order_per_run() {
        let store = MemoryEventStore::new();
        let run_id = Uuid::new_v4();
        for event_type in [EventType::RunCreated, EventType::RunQueued, EventType::RunStarted] {
            store
                .append(WorkflowEvent::new(event_type).run(run_id))
                .await
                .unwrap();
        }
        let events = store.list_by_run(run_id, None).await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::RunCreated, EventType::RunQueued, EventType::RunStarted]
        );
    }

    #[tokio::test]
    async fn list_by_scope_narrows_by_type() {
        let store = MemoryEventStore::new();
        let scope = Scope::new("tenant-a");
        store
            .append(WorkflowEvent::new(EventType::RunCreated).scope(Some(scope.clone())))
            .await
            .unwrap();
        store
            .append(WorkflowEvent::new(EventType::RunFailed).scope(Some(scope.clone())))
            .await
            .unwrap();

        let only_failed = store
            .list_by_scope(&scope, Some(&[EventType::RunFailed]))
            .await
            .unwrap();
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].event_type, EventType::RunFailed);
    }

    #[tokio::test]
    async fn run_update_requires_existing_record() {
        let store = MemoryRunStore::new();
        let run = Run::new("wf", 1, None, BTreeMap::new());
        assert!(matches!(
            store.update(run).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn provenance_lookup_by_run() {
        use bilko_core::hash::ContentHash;
        let store = MemoryProvenanceStore::new();
        let run_id = Uuid::new_v4();
        let prov = Provenance {
            id: Uuid::new_v4(),
            run_id,
            workflow_id: "wf".into(),
            workflow_version: 1,
            scope: None,
            created_at: Utc::now(),
            determinism_grade: bilko_core::DeterminismGrade::Pure,
            workflow_hash: ContentHash::sha256("aa"),
            plan_hash: ContentHash::sha256("bb"),
            input_hashes: BTreeMap::new(),
            step_images: vec![],
            transcript: vec![],
        };
        store.create(prov.clone()).await.unwrap();
        let fetched = store.get_by_run(run_id, None).await.unwrap().unwrap();
        assert_eq!(fetched.id, prov.id);
    }
}
