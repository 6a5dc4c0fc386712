// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler registry, process-wide and embeddable.
//!
//! The registry is a typed map from step type to handler. A process-wide
//! default serves the library entry surface; the compiler and executor take
//! an explicit registry handle so embedders can isolate their own sets.

use crate::handler::StepHandler;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

/// A typed registry of [`StepHandler`]s keyed by step type.
///
/// Safe for concurrent reads; writes take the registry exclusively.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn StepHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared type, replacing any previous entry.
    pub fn register(&self, handler: impl StepHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    /// Register a shared handler, replacing any previous entry.
    pub fn register_arc(&self, handler: Arc<dyn StepHandler>) {
        let step_type = handler.step_type().to_string();
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .insert(step_type, handler);
    }

    /// Look up the handler for a step type.
    #[must_use]
    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .get(step_type)
            .cloned()
    }

    /// Check whether a handler is registered for the step type.
    #[must_use]
    pub fn contains(&self, step_type: &str) -> bool {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .contains_key(step_type)
    }

    /// Sorted list of registered step types.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .expect("handler registry poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Remove every handler.
    ///
    /// The reset hook for tests that need isolation from other tests'
    /// registrations.
    pub fn clear(&self) {
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .clear();
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL: LazyLock<Arc<HandlerRegistry>> = LazyLock::new(|| Arc::new(HandlerRegistry::new()));

/// The process-wide default registry.
#[must_use]
pub fn global_registry() -> Arc<HandlerRegistry> {
    Arc::clone(&GLOBAL)
}

/// Register a handler in the process-wide registry.
pub fn register_step_handler(handler: impl StepHandler + 'static) {
    GLOBAL.register(handler);
}

/// Look up a handler in the process-wide registry.
#[must_use]
pub fn get_step_handler(step_type: &str) -> Option<Arc<dyn StepHandler>> {
    GLOBAL.get(step_type)
}

/// Sorted step types registered in the process-wide registry.
#[must_use]
pub fn registered_handlers() -> Vec<String> {
    GLOBAL.list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepContext;
    use crate::handler::{HandlerFailure, StepOutputs};
    use async_trait::async_trait;
    use bilko_core::plan::CompiledStep;

    struct Fixed(&'static str);

    #[async_trait]
    impl StepHandler for Fixed {
        fn step_type(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _step: &CompiledStep,
            _ctx: &StepContext,
        ) -> Result<StepOutputs, HandlerFailure> {
            Ok(StepOutputs::new())
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register(Fixed("transform.map"));
        assert!(registry.contains("transform.map"));
        assert!(registry.get("transform.map").is_some());
        assert!(registry.get("http.get").is_none());
    }

    #[test]
    fn list_is_sorted() {
        let registry = HandlerRegistry::new();
        registry.register(Fixed("transform.map"));
        registry.register(Fixed("ai.complete"));
        registry.register(Fixed("http.get"));
        assert_eq!(registry.list(), vec!["ai.complete", "http.get", "transform.map"]);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = HandlerRegistry::new();
        registry.register(Fixed("transform.map"));
        registry.register(Fixed("transform.map"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_resets_the_registry() {
        let registry = HandlerRegistry::new();
        registry.register(Fixed("transform.map"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
