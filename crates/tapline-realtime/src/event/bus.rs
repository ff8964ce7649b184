//! Listener registry with per-listener fault isolation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, trace};

use crate::metrics::TransportMetrics;

use super::types::{EventKind, TransportEvent};

/// A registered event callback.
pub type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    /// `None` receives every event.
    kind: Option<EventKind>,
    listener: Listener,
}

/// Fan-out point for [`TransportEvent`]s.
///
/// Emission snapshots the matching listeners and releases the lock before
/// calling them, so listeners may subscribe, unsubscribe or emit on the same
/// bus. A panicking listener is logged and skipped; the remaining listeners
/// still receive the event.
pub struct EventBus {
    /// Owner name, for logs.
    name: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
    metrics: Arc<TransportMetrics>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new(name: &'static str, metrics: Arc<TransportMetrics>) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Register `listener` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    /// Register `listener` for every event.
    pub fn subscribe_all<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration { id, kind, listener });
        trace!(bus = self.name, ?kind, "Listener registered");
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() < before
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every matching listener.
    ///
    /// Returns the number of listeners that returned normally.
    pub fn emit(&self, event: &TransportEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|r| r.kind.is_none_or(|k| k == kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        let mut delivered = 0;
        for listener in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    TransportMetrics::incr(&self.metrics.listener_panics);
                    error!(
                        bus = self.name,
                        kind = %kind,
                        panic = %panic_message(payload.as_ref()),
                        "Event listener panicked"
                    );
                }
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
