// ── Push-registration state ──
//
// Device token and enabled-channel set live under a single critical
// section so an audit refresh can never interleave with a concurrent
// enable/disable. Mutations publish a fresh snapshot through a `watch`
// channel for reactive consumers.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;

// ── DeviceToken ──────────────────────────────────────────────────────

/// Opaque device push token handed over by the platform registration
/// flow. Rendered as lowercase hex on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken(Bytes);

impl DeviceToken {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex encoding used in registration URLs.
    pub fn as_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ── PushStore ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PushState {
    token: Option<DeviceToken>,
    channels: BTreeSet<String>,
    /// Whether `enabled_for_push` has been announced for the current
    /// token. Reset whenever the token changes.
    announced: bool,
}

/// Authoritative bookkeeping for the device token and the set of
/// push-enabled channels.
///
/// The channel set mutates only through the operations here; consumers
/// read it via [`snapshot`](Self::snapshot) or subscribe to changes via
/// [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct PushStore {
    state: Mutex<PushState>,
    snapshot: watch::Sender<Arc<BTreeSet<String>>>,
}

impl Default for PushStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PushStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(BTreeSet::new()));
        Self {
            state: Mutex::new(PushState::default()),
            snapshot,
        }
    }

    // ── Device token ─────────────────────────────────────────────────

    /// Store or replace the device token. Resets the enablement
    /// announcement latch when the token actually changes.
    pub fn set_token(&self, token: DeviceToken) {
        let mut state = self.lock();
        if state.token.as_ref() != Some(&token) {
            state.announced = false;
        }
        state.token = Some(token);
    }

    /// True iff a non-empty token is stored.
    pub fn has_token(&self) -> bool {
        self.lock()
            .token
            .as_ref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Hex form of the stored token, or `None` if absent or empty.
    pub fn token_hex(&self) -> Option<String> {
        self.lock()
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(DeviceToken::as_hex)
    }

    /// Latch the "enabled for push" announcement for the current token.
    /// Returns `true` only on the first call since the token was set.
    pub fn mark_announced(&self) -> bool {
        let mut state = self.lock();
        let first = !state.announced;
        state.announced = true;
        first
    }

    // ── Channel set ──────────────────────────────────────────────────

    pub fn insert_channel(&self, channel: &str) {
        let mut state = self.lock();
        state.channels.insert(channel.to_owned());
        self.publish(&state);
    }

    pub fn remove_channel(&self, channel: &str) {
        let mut state = self.lock();
        state.channels.remove(channel);
        self.publish(&state);
    }

    pub fn clear_channels(&self) {
        let mut state = self.lock();
        state.channels.clear();
        self.publish(&state);
    }

    /// Replace the set wholesale with the authoritative server-side list
    /// (audit semantics: entries not in `channels` are gone afterwards).
    pub fn replace_channels(&self, channels: impl IntoIterator<Item = String>) {
        let mut state = self.lock();
        state.channels = channels.into_iter().collect();
        self.publish(&state);
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<BTreeSet<String>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BTreeSet<String>>> {
        self.snapshot.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the snapshot under the state lock so subscribers observe
    /// mutations in order.
    fn publish(&self, state: &PushState) {
        let fresh = Arc::new(state.channels.clone());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = fresh);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
