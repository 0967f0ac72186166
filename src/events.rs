//! Broker notifications.
//!
//! The UI layer (or any other observer) subscribes to an [`EventBus`] and is
//! told about provider lifecycle changes and search progress. Delivery is
//! synchronous, in subscription order. A listener that panics is caught and
//! logged; the remaining listeners and the emitting operation are unaffected.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::error;

use crate::types::{ProviderSettings, ResultItem};

/// Something observable happened inside the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    ProviderRegistered {
        provider: String,
    },
    ProviderUnregistered {
        provider: String,
    },
    ProviderEnabled {
        provider: String,
    },
    ProviderDisabled {
        provider: String,
    },
    ProviderConfigured {
        provider: String,
        settings: ProviderSettings,
    },
    SearchStarted {
        query: String,
    },
    /// Final merged results for a query (possibly empty).
    ResultsReady {
        query: String,
        results: Vec<ResultItem>,
    },
    SearchEnded {
        query: String,
        result_count: usize,
        elapsed: Duration,
    },
}

impl BrokerEvent {
    /// Stable short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderRegistered { .. } => "provider_registered",
            Self::ProviderUnregistered { .. } => "provider_unregistered",
            Self::ProviderEnabled { .. } => "provider_enabled",
            Self::ProviderDisabled { .. } => "provider_disabled",
            Self::ProviderConfigured { .. } => "provider_configured",
            Self::SearchStarted { .. } => "search_started",
            Self::ResultsReady { .. } => "results_ready",
            Self::SearchEnded { .. } => "search_ended",
        }
    }
}

/// Callback invoked for every event.
pub type Listener = Arc<dyn Fn(&BrokerEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Synchronous fan-out of [`BrokerEvent`]s to registered listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are called in subscription order.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BrokerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every listener.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe from inside a callback.
    pub fn emit(&self, event: &BrokerEvent) {
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(listener = id.0, event = event.kind(), "event listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
