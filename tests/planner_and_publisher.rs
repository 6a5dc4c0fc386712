// SPDX-License-Identifier: MIT OR Apache-2.0
//! Planner certification through the facade, and publisher failure
//! isolation observed from a live run.

use async_trait::async_trait;
use bilko_flow::{
    CompiledStep, CreateRunRequest, EventPublisher, EventType, Executor, HandlerFailure,
    HandlerRegistry, MemoryAttestationStore, MemoryEventStore, MemoryProvenanceStore,
    MemoryRunStore, MemoryWorkflowStore, RunStatus, ScriptedPlanner, StepBuilder, StepContext,
    StepHandler, StepOutputs, Subscription, WorkflowBuilder, certify_planner, validate_proposal,
};
use bilko_store::{EventStore, WorkflowStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn scripted_planner_passes_certification() {
    let report = certify_planner(&ScriptedPlanner::new()).await;
    assert!(report.passed, "failed checks: {:?}", report.tests);
    let names: Vec<&str> = report.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "version-info-complete",
            "supported-versions-recognized",
            "propose-workflow-compiles",
            "propose-repair-validates",
        ]
    );
}

#[tokio::test]
async fn planner_proposals_compile_before_acceptance() {
    let planner = ScriptedPlanner::new();
    let proposal = planner_propose(&planner).await;
    let plan = validate_proposal(&planner, &proposal, &HandlerRegistry::new()).unwrap();
    assert_eq!(plan.execution_order, vec!["s1"]);
}

async fn planner_propose(planner: &ScriptedPlanner) -> bilko_flow::WorkflowProposal {
    use bilko_flow::Planner;
    planner
        .propose_workflow("turn a record into a summary")
        .await
        .unwrap()
}

struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    fn step_type(&self) -> &str {
        "transform.map"
    }

    async fn execute(
        &self,
        _step: &CompiledStep,
        _ctx: &StepContext,
    ) -> Result<StepOutputs, HandlerFailure> {
        Ok(StepOutputs::new())
    }
}

#[tokio::test]
async fn panicking_subscriber_does_not_affect_the_run() {
    let workflows = Arc::new(MemoryWorkflowStore::new());
    let events = Arc::new(MemoryEventStore::new());
    let publisher = Arc::new(EventPublisher::new(Arc::clone(&events) as Arc<dyn EventStore>));
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(EchoHandler);

    // A hostile subscriber and a well-behaved one.
    let _bad = publisher.subscribe(Subscription::new(|_| panic!("observer bug")));
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let _good = publisher.subscribe(Subscription::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let executor = Executor::new(
        Arc::clone(&workflows) as Arc<dyn WorkflowStore>,
        Arc::new(MemoryRunStore::new()),
        Arc::new(MemoryProvenanceStore::new()),
        Arc::new(MemoryAttestationStore::new()),
        Arc::clone(&publisher),
        registry,
    );

    let wf = WorkflowBuilder::new("wf-iso-pub", "isolated publishing")
        .step(StepBuilder::new("s1", "transform.map").build())
        .build();
    workflows.create(wf).await.unwrap();

    let run = executor
        .create_run(CreateRunRequest::new("wf-iso-pub"))
        .await
        .unwrap();
    let run = executor
        .execute_run(run.id, None, BTreeMap::new())
        .await
        .unwrap();

    // The run finished despite every event hitting a panicking subscriber.
    assert_eq!(run.status, RunStatus::Succeeded);

    // Both persistence and the healthy subscriber saw every event.
    let stored = events.list_by_run(run.id, None).await.unwrap();
    assert!(stored.iter().any(|e| e.event_type == EventType::RunSucceeded));
    assert_eq!(delivered.load(Ordering::SeqCst), stored.len());
}
