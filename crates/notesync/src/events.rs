//! Event infrastructure for the sync engine.
//!
//! Provides `SyncEvent` for observers (status lines, list views) and
//! `EventBus` for subscriptions. Events are the only channel by which a
//! presentation layer learns about write outcomes; no errors escape the
//! engine across the write boundary.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::note::NoteId;
use crate::status::SyncStatus;

/// Events emitted as notes move through the sync state machine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A note's sync status changed.
    StatusChanged { id: NoteId, status: SyncStatus },
    /// A versioned write left for the server.
    WriteDispatched {
        id: NoteId,
        /// The version the snapshot was based on.
        version: u64,
    },
    /// An in-flight write resolved with exactly one outcome.
    WriteResolved {
        id: NoteId,
        /// The outcome status (`Saved`, `Conflict` or `Error`), even if the
        /// note immediately re-entered `Scheduled` for a dirty re-dispatch.
        status: SyncStatus,
        /// The working copy's version after reconciliation.
        version: u64,
    },
    /// A write was rejected because the session is no longer valid.
    /// Renewing the session is the subscriber's job, not the engine's.
    SessionExpired { id: NoteId },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing sync events to subscribers.
///
/// Thread-safe; wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(SyncEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns a `Subscription` that unsubscribes on
    /// drop. Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write so Drop can't deadlock if it runs while emit holds the
        // read lock during panic unwinding.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SyncEvent) {
        // Clone the callback list so a callback may subscribe without
        // deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event() -> SyncEvent {
        SyncEvent::StatusChanged {
            id: NoteId::new(1),
            status: SyncStatus::Scheduled,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(status_event());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.emit(status_event());
            assert_eq!(count.load(Ordering::Relaxed), 1);
        }

        bus.emit(status_event());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::WriteResolved {
            id: NoteId::new(3),
            status: SyncStatus::Conflict,
            version: 5,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"writeResolved\""));
        assert!(json.contains("\"status\":\"conflict\""));
        assert!(json.contains("\"version\":5"));
    }
}
