// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation registry and step execution context.
//!
//! Cancellation is a soft cooperative signal. The registry holds the set of
//! cancellation-requested run ids; a [`CancelProbe`] consults that shared
//! set on every read, so a request raised while a step is suspended is
//! observed at the next check without re-building the context.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared set of cancellation-requested run ids.
///
/// All clones share the same underlying state; requesting cancellation
/// through one immediately makes every probe observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl CancelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of a run. Idempotent.
    pub fn request(&self, run_id: Uuid) {
        self.inner.lock().expect("cancel set poisoned").insert(run_id);
    }

    /// Returns `true` when cancellation has been requested for the run.
    #[must_use]
    pub fn is_requested(&self, run_id: Uuid) -> bool {
        self.inner.lock().expect("cancel set poisoned").contains(&run_id)
    }

    /// Drop the run from the set.
    ///
    /// Called whenever a run enters a terminal state so the set cannot grow
    /// unboundedly.
    pub fn clear(&self, run_id: Uuid) {
        self.inner.lock().expect("cancel set poisoned").remove(&run_id);
    }

    /// Create a live probe bound to one run.
    #[must_use]
    pub fn probe(&self, run_id: Uuid) -> CancelProbe {
        CancelProbe {
            registry: self.clone(),
            run_id,
        }
    }
}

/// A live cancellation view for a single run.
///
/// Every call re-reads the shared registry; the flag is never snapshotted
/// into the context at construction time.
#[derive(Debug, Clone)]
pub struct CancelProbe {
    registry: CancelRegistry,
    run_id: Uuid,
}

impl CancelProbe {
    /// Returns `true` when cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.registry.is_requested(self.run_id)
    }

    /// A probe that never reports cancellation, for tests and tooling.
    #[must_use]
    pub fn detached() -> Self {
        CancelRegistry::new().probe(Uuid::nil())
    }
}

/// Everything a handler sees while executing one step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Run being executed.
    pub run_id: Uuid,

    /// Source workflow id.
    pub workflow_id: String,

    /// Secret values by name, already resolved.
    pub secrets: BTreeMap<String, String>,

    /// Outputs of completed upstream steps, keyed by step id.
    pub upstream_outputs: BTreeMap<String, BTreeMap<String, serde_json::Value>>,

    /// Live cancellation view.
    pub cancellation: CancelProbe,
}

impl StepContext {
    /// Build a context for one step dispatch.
    #[must_use]
    pub fn new(run_id: Uuid, workflow_id: impl Into<String>, cancellation: CancelProbe) -> Self {
        Self {
            run_id,
            workflow_id: workflow_id.into(),
            secrets: BTreeMap::new(),
            upstream_outputs: BTreeMap::new(),
            cancellation,
        }
    }

    /// Outputs of one upstream step, if it completed.
    #[must_use]
    pub fn upstream(&self, step_id: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.upstream_outputs.get(step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reads_are_live_not_snapshots() {
        let registry = CancelRegistry::new();
        let run_id = Uuid::new_v4();
        let probe = registry.probe(run_id);
        assert!(!probe.is_canceled());
        registry.request(run_id);
        assert!(probe.is_canceled());
    }

    #[test]
    fn clear_removes_the_run() {
        let registry = CancelRegistry::new();
        let run_id = Uuid::new_v4();
        registry.request(run_id);
        assert!(registry.is_requested(run_id));
        registry.clear(run_id);
        assert!(!registry.is_requested(run_id));
    }

    #[test]
    fn probes_are_scoped_per_run() {
        let registry = CancelRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.request(a);
        assert!(registry.probe(a).is_canceled());
        assert!(!registry.probe(b).is_canceled());
    }

    #[test]
    fn request_is_idempotent() {
        let registry = CancelRegistry::new();
        let run_id = Uuid::new_v4();
        registry.request(run_id);
        registry.request(run_id);
        assert!(registry.is_requested(run_id));
    }

    #[test]
    fn detached_probe_never_cancels() {
        assert!(!CancelProbe::detached().is_canceled());
    }
}
