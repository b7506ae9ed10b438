//! Priority-ordered listener registry.
//!
//! [`ListenerRegistry`] owns the registered [`Listener`]s and a derived
//! `event type -> listeners` index, sorted ascending by priority and rebuilt
//! on every registration change. Dispatch invokes every matching listener in
//! index order and waits for all of them to settle.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use courier_core::LifecycleEvent;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::BusEvent;
use crate::listener::Listener;

/// Snapshot of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    pub event_types: Vec<String>,
    pub enabled: bool,
    pub priority: i32,
}

#[derive(Default)]
struct RegistryState {
    /// Registrations in first-registration order.
    listeners: Vec<Arc<dyn Listener>>,
    index: HashMap<String, Vec<Arc<dyn Listener>>>,
}

impl RegistryState {
    fn position(&self, name: &str) -> Option<usize> {
        self.listeners.iter().position(|l| l.name() == name)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for listener in &self.listeners {
            for event_type in listener.event_types() {
                self.index
                    .entry(event_type.clone())
                    .or_default()
                    .push(Arc::clone(listener));
            }
        }
        // Stable: equal priorities keep registration order.
        for listeners in self.index.values_mut() {
            listeners.sort_by_key(|l| l.priority());
        }
    }
}

/// Holds listener registrations and fans lifecycle events out to them.
#[derive(Default)]
pub struct ListenerRegistry {
    state: RwLock<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under its name.
    ///
    /// Re-registering a name replaces the earlier listener in place.
    pub async fn register(&self, listener: Arc<dyn Listener>) {
        let name = listener.name().to_string();
        let mut state = self.state.write().await;
        match state.position(&name) {
            Some(i) => state.listeners[i] = listener,
            None => state.listeners.push(listener),
        }
        state.rebuild_index();
        tracing::info!(listener = %name, "Registered listener");
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(i) = state.position(name) else {
            return false;
        };
        state.listeners.remove(i);
        state.rebuild_index();
        tracing::info!(listener = name, "Unregistered listener");
        true
    }

    /// Returns `false` when no listener has this name.
    pub async fn enable(&self, name: &str) -> bool {
        self.toggle(name, true).await
    }

    /// Returns `false` when no listener has this name.
    pub async fn disable(&self, name: &str) -> bool {
        self.toggle(name, false).await
    }

    async fn toggle(&self, name: &str, enabled: bool) -> bool {
        let state = self.state.read().await;
        let Some(i) = state.position(name) else {
            return false;
        };
        let listener = &state.listeners[i];
        if enabled {
            listener.enable();
        } else {
            listener.disable();
        }
        tracing::info!(listener = name, enabled, "Listener toggled");
        true
    }

    pub async fn listeners(&self) -> Vec<Arc<dyn Listener>> {
        self.state.read().await.listeners.clone()
    }

    /// Listeners subscribed to `event_type`, in dispatch order.
    pub async fn listeners_for(&self, event_type: &str) -> Vec<Arc<dyn Listener>> {
        self.state
            .read()
            .await
            .index
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn listener_status(&self) -> Vec<ListenerStatus> {
        self.state
            .read()
            .await
            .listeners
            .iter()
            .map(|l| ListenerStatus {
                name: l.name().to_string(),
                event_types: l.event_types().to_vec(),
                enabled: l.is_enabled(),
                priority: l.priority(),
            })
            .collect()
    }

    /// Invoke every listener subscribed to the event's type.
    ///
    /// Listeners are started in ascending priority order and run
    /// concurrently; this returns once all of them have finished. A panic
    /// in one listener is logged and does not affect the others.
    pub async fn dispatch(&self, event: &LifecycleEvent) {
        let event_type = event.event_type();
        let listeners = self.listeners_for(event_type).await;

        if listeners.is_empty() {
            tracing::debug!(event_type, "No listeners for event");
            return;
        }

        tracing::debug!(
            event_type,
            listener_count = listeners.len(),
            "Dispatching event to listeners"
        );

        let outcomes = join_all(
            listeners
                .iter()
                .map(|listener| AssertUnwindSafe(listener.handle(event)).catch_unwind()),
        )
        .await;

        for (listener, outcome) in listeners.iter().zip(outcomes) {
            if outcome.is_err() {
                tracing::error!(
                    listener = listener.name(),
                    event_type,
                    "Listener panicked while handling event"
                );
            }
        }
    }

    /// Dispatch every lifecycle event received from the bus.
    ///
    /// Each event is dispatched on its own task so a listener stuck in
    /// retry backoff never holds up intake. Exits when `cancel` fires or the
    /// bus is dropped, after in-flight dispatches finish.
    pub async fn run(self: Arc<Self>, mut receiver: broadcast::Receiver<BusEvent>, cancel: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Listener registry cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(BusEvent::Lifecycle(event)) => {
                        let registry = Arc::clone(&self);
                        tracker.spawn(async move {
                            registry.dispatch(&event).await;
                        });
                    }
                    Ok(BusEvent::Business(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            skipped = n,
                            "Listener registry lagged, some lifecycle events were not dispatched"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, listener registry shutting down");
                        break;
                    }
                },
            }
        }

        tracker.close();
        if !tracker.is_empty() {
            tracing::info!(in_flight = tracker.len(), "Waiting for listener dispatches");
        }
        tracker.wait().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
