//! Sync lifecycle events and the observer bus that delivers them.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEventKind {
    Start,
    Progress,
    Complete,
    Error,
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// One lifecycle notification with a single human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl SyncEvent {
    pub fn start(message: impl Into<String>) -> Self {
        Self {
            kind: SyncEventKind::Start,
            message: message.into(),
            progress: None,
        }
    }

    pub fn progress(current: usize, total: usize) -> Self {
        Self {
            kind: SyncEventKind::Progress,
            message: format!("Synced {current} of {total}"),
            progress: Some(Progress { current, total }),
        }
    }

    pub fn complete(message: impl Into<String>, total: usize) -> Self {
        Self {
            kind: SyncEventKind::Complete,
            message: message.into(),
            progress: Some(Progress {
                current: total,
                total,
            }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: SyncEventKind::Error,
            message: message.into(),
            progress: None,
        }
    }
}

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Ordered, panic-isolated fan-out of [`SyncEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in registration order.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    /// Deliver `event` to every handler. A panicking handler is logged and
    /// skipped. Handlers may subscribe or unsubscribe while being called.
    pub fn emit(&self, event: &SyncEvent) {
        let handlers: Vec<Handler> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!("Sync event handler panicked on {} event", event.kind);
            }
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the handler registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recorder(bus: &EventBus, label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
        let log = Arc::clone(log);
        bus.subscribe(move |event| {
            log.lock().unwrap().push(format!("{label}:{}", event.kind));
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&bus, "a", &log);
        let _b = recorder(&bus, "b", &log);

        bus.emit(&SyncEvent::start("Syncing 1 item"));

        assert_eq!(*log.lock().unwrap(), vec!["a:start", "b:start"]);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _boom = bus.subscribe(|_| panic!("banner widget crashed"));
        let _ok = recorder(&bus, "ok", &log);

        bus.emit(&SyncEvent::error("Network error"));

        assert_eq!(*log.lock().unwrap(), vec!["ok:error"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&bus, "a", &log);
        let _b = recorder(&bus, "b", &log);

        a.unsubscribe();
        bus.emit(&SyncEvent::complete("Nothing to sync", 0));

        assert_eq!(*log.lock().unwrap(), vec!["b:complete"]);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn progress_event_carries_counts() {
        let event = SyncEvent::progress(2, 5);
        assert_eq!(event.progress, Some(Progress { current: 2, total: 5 }));
        assert_eq!(event.message, "Synced 2 of 5");
    }
}
