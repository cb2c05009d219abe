//! # Snapshot Publisher
//!
//! Listener registry. Listeners are notified in registration order; a
//! publish works on a copy of the registry, so unsubscribing mid-publish
//! does not affect the delivery already under way.

use crate::domain::Snapshot;
use crate::ports::SnapshotListener;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Registered snapshot listeners keyed by registration sequence.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, SnapshotListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and hand back its subscription handle.
    pub fn register(self: &Arc<Self>, listener: SnapshotListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, listener);
        debug!(subscription = id, "Snapshot listener registered");

        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Number of active listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver `snapshot` to every listener registered at call time.
    pub fn notify(&self, snapshot: &Arc<Snapshot>) -> usize {
        let targets: Vec<SnapshotListener> = self.listeners.lock().values().cloned().collect();
        for listener in &targets {
            listener(snapshot);
        }
        targets.len()
    }

    fn remove(&self, id: u64) {
        if self.listeners.lock().remove(&id).is_some() {
            debug!(subscription = id, "Snapshot listener removed");
        }
    }
}

/// Handle for a registered listener.
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep
/// the listener for the engine's lifetime.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Registration sequence number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop future deliveries.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered after this handle goes away.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(log: &Arc<Mutex<Vec<(u64, u64)>>>, tag: u64) -> SnapshotListener {
        let log = Arc::clone(log);
        Arc::new(move |snap: &Arc<Snapshot>| log.lock().push((tag, snap.version)))
    }

    fn versioned(version: u64) -> Arc<Snapshot> {
        let mut snap = Snapshot::disconnected();
        snap.version = version;
        Arc::new(snap)
    }

    #[test]
    fn test_notify_in_registration_order() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.register(recording(&log, 1));
        let _b = registry.register(recording(&log, 2));

        assert_eq!(registry.notify(&versioned(1)), 2);
        assert_eq!(*log.lock(), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = registry.register(recording(&log, 1));

        registry.notify(&versioned(1));
        sub.unsubscribe();
        registry.notify(&versioned(2));

        assert_eq!(*log.lock(), vec![(1, 1)]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_keeps_listener() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(recording(&log, 1)).detach();

        registry.notify(&versioned(3));
        assert_eq!(registry.len(), 1);
        assert_eq!(*log.lock(), vec![(1, 3)]);
    }

    #[test]
    fn test_unsubscribe_during_publish_keeps_in_flight_delivery() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&victim);
        let _first = registry.register(Arc::new(move |_snap: &Arc<Snapshot>| {
            if let Some(sub) = slot.lock().take() {
                sub.unsubscribe();
            }
        }));
        *victim.lock() = Some(registry.register(recording(&log, 2)));

        registry.notify(&versioned(1));
        registry.notify(&versioned(2));

        assert_eq!(*log.lock(), vec![(2, 1)]);
    }
}
