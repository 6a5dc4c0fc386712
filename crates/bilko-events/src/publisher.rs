// SPDX-License-Identifier: MIT OR Apache-2.0
//! The publisher and its subscription model.
//!
//! `publish_event` persists first, then fans out synchronously. Persistence
//! failures surface to the caller (who decides whether to swallow them);
//! subscriber failures never do.

use bilko_core::event::{EventType, WorkflowEvent};
use bilko_core::{Scope, scope_matches};
use bilko_store::{EventStore, StoreResult};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use tracing::warn;
use uuid::Uuid;

/// Callback invoked for each matching event.
pub type EventCallback = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// A live subscription to published events.
pub struct Subscription {
    /// Subscription identifier.
    pub id: Uuid,

    /// Tenant filter. `None` receives events from every scope.
    pub scope: Option<Scope>,

    /// Type filter. `None` receives every type.
    pub event_types: Option<Vec<EventType>>,

    /// Invoked synchronously for each matching event.
    pub callback: EventCallback,
}

impl Subscription {
    /// Subscribe to every event.
    #[must_use]
    pub fn new(callback: impl Fn(&WorkflowEvent) + Send + Sync + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope: None,
            event_types: None,
            callback: Arc::new(callback),
        }
    }

    /// Narrow to one tenant scope.
    #[must_use]
    pub fn scoped(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Narrow to a set of event types.
    #[must_use]
    pub fn types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    fn matches(&self, event: &WorkflowEvent) -> bool {
        let scope_ok = scope_matches(event.scope.as_ref(), self.scope.as_ref());
        let type_ok = self
            .event_types
            .as_ref()
            .is_none_or(|set| set.contains(&event.event_type));
        scope_ok && type_ok
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("event_types", &self.event_types)
            .finish_non_exhaustive()
    }
}

/// Removes its subscription from the publisher on demand.
///
/// Dropping the guard without calling [`unsubscribe`](Self::unsubscribe)
/// leaves the subscription live.
#[derive(Debug)]
pub struct SubscriptionGuard {
    id: Uuid,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl SubscriptionGuard {
    /// Remove the subscription. O(n) over the live subscription list.
    pub fn unsubscribe(self) {
        self.subscriptions
            .write()
            .expect("subscription list poisoned")
            .retain(|s| s.id != self.id);
    }
}

/// Persists events in order per run and fans them out to subscribers.
pub struct EventPublisher {
    store: Arc<dyn EventStore>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl EventPublisher {
    /// Create a publisher over the given event store.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a subscription and return its removal guard.
    #[must_use]
    pub fn subscribe(&self, subscription: Subscription) -> SubscriptionGuard {
        let id = subscription.id;
        self.subscriptions
            .write()
            .expect("subscription list poisoned")
            .push(subscription);
        SubscriptionGuard {
            id,
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .expect("subscription list poisoned")
            .len()
    }

    /// Persist an event, then deliver it to every matching subscription.
    ///
    /// Delivery is synchronous and isolated: a subscriber that panics is
    /// logged and skipped, and the remaining subscribers still receive the
    /// event. For events about the same run, subscribers observe publish
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the append fails; nothing is fanned
    /// out in that case.
    pub async fn publish_event(&self, event: WorkflowEvent) -> StoreResult<WorkflowEvent> {
        let persisted = self.store.append(event).await?;

        // Snapshot matching callbacks so a subscriber that re-subscribes
        // from its callback cannot deadlock against the list lock.
        let matching: Vec<(Uuid, EventCallback)> = {
            let subscriptions = self
                .subscriptions
                .read()
                .expect("subscription list poisoned");
            subscriptions
                .iter()
                .filter(|s| s.matches(&persisted))
                .map(|s| (s.id, Arc::clone(&s.callback)))
                .collect()
        };

        for (id, callback) in matching {
            let result = catch_unwind(AssertUnwindSafe(|| callback(&persisted)));
            if result.is_err() {
                warn!(
                    target: "bilko.publisher",
                    subscription = %id,
                    event = %persisted.event_type,
                    "subscriber panicked; event delivery continues"
                );
            }
        }
        Ok(persisted)
    }

    /// Events about one run, in publish order.
    ///
    /// # Errors
    ///
    /// Returns the store's error on lookup failure.
    pub async fn get_events_by_run(
        &self,
        run_id: Uuid,
        scope: Option<&Scope>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        self.store.list_by_run(run_id, scope).await
    }

    /// Events visible under a scope, optionally narrowed by type.
    ///
    /// # Errors
    ///
    /// Returns the store's error on lookup failure.
    pub async fn get_events_by_scope(
        &self,
        scope: &Scope,
        types: Option<&[EventType]>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        self.store.list_by_scope(scope, types).await
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
