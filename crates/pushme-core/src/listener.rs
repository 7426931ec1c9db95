// ── Listener protocol and registry ──
//
// Listeners are held as `Weak` references: the manager never owns a
// consumer's lifetime, and a listener dropped elsewhere simply stops
// receiving callbacks. Fan-out snapshots the set before invoking
// callbacks, so add/remove during a broadcast neither crashes nor
// delivers to a half-removed listener.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use pushme_api::InboundMessage;

/// Capability contract for consumers that want updates from the
/// [`DataManager`](crate::DataManager).
///
/// All callbacks are one-way fire-and-forget: they return nothing and
/// must not block. Enablement callbacks fire on the task that ran the
/// operation; message delivery comes from the manager's background
/// bridge task -- UI consumers hop back to their own rendering context
/// themselves.
pub trait DataManagerListener: Send + Sync {
    /// The device can now receive push notifications: a token is stored
    /// and the first server-side enable for it succeeded.
    fn enabled_for_push(&self) {}

    /// Push capability could not be established (no token stored, or the
    /// network rejected the registration).
    fn push_enable_failed(&self) {}

    /// A real-time message arrived on a subscribed channel.
    fn did_receive_message(&self, message: &InboundMessage) {
        let _ = message;
    }
}

/// Weak-reference registry with idempotent add/remove and
/// snapshot-then-iterate fan-out.
#[derive(Default)]
pub(crate) struct ListenerSet {
    inner: Mutex<Vec<Weak<dyn DataManagerListener>>>,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Adding one that is already present is a
    /// no-op (pointer identity).
    pub(crate) fn add(&self, listener: &Arc<dyn DataManagerListener>) {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.lock();
        if !listeners.iter().any(|w| Weak::ptr_eq(w, &weak)) {
            listeners.push(weak);
        }
    }

    /// Deregister a listener. Removing one that was never added is a
    /// no-op. Once this returns, the listener receives no further
    /// callbacks.
    pub(crate) fn remove(&self, listener: &Arc<dyn DataManagerListener>) {
        let weak = Arc::downgrade(listener);
        self.lock().retain(|w| !Weak::ptr_eq(w, &weak));
    }

    /// Number of live registrations (dead weak refs are pruned first).
    #[cfg(test)]
    fn len(&self) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|w| w.strong_count() > 0);
        listeners.len()
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    pub(crate) fn notify_enabled(&self) {
        for listener in self.live() {
            listener.enabled_for_push();
        }
    }

    pub(crate) fn notify_enable_failed(&self) {
        for listener in self.live() {
            listener.push_enable_failed();
        }
    }

    pub(crate) fn notify_message(&self, message: &InboundMessage) {
        for listener in self.live() {
            listener.did_receive_message(message);
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Snapshot the currently live listeners, pruning dead weak refs.
    /// Callbacks run on the snapshot with the lock released.
    fn live(&self) -> Vec<Arc<dyn DataManagerListener>> {
        let mut listeners = self.lock();
        listeners.retain(|w| w.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<dyn DataManagerListener>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
