// ── Data Manager ──
//
// Intermediate layer between application code and the real-time
// messaging network. Owns the device push token and the set of
// push-enabled channels, routes UI intent to the network, and fans
// inbound messages and state changes out to registered listeners.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pushme_api::{Keyset, MessagingClient};
use pushme_api::transport::{TlsMode, TransportConfig};
use secrecy::ExposeSecret;

use crate::config::{ManagerConfig, TlsVerification};
use crate::error::CoreError;
use crate::listener::{DataManagerListener, ListenerSet};
use crate::remote::RemoteMessaging;
use crate::store::{DeviceToken, PushStore};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. One constructed instance is
/// handed to whichever component needs it -- there is no global
/// singleton. [`connect()`](Self::connect) starts the real-time
/// subscription on the default channel; every push operation works with
/// or without it.
pub struct DataManager<C: RemoteMessaging = MessagingClient> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: RemoteMessaging> Clone for DataManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ManagerInner<C> {
    config: ManagerConfig,
    remote: C,
    store: PushStore,
    listeners: ListenerSet,
    cancel: CancellationToken,
    bridge_task: Mutex<Option<JoinHandle<()>>>,
}

impl DataManager<MessagingClient> {
    /// Build a manager backed by the production HTTP client.
    pub fn from_config(config: ManagerConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: match &config.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: config.timeout,
        };
        let keyset = Keyset {
            publish_key: config.publish_key.expose_secret().to_owned(),
            subscribe_key: config.subscribe_key.expose_secret().to_owned(),
        };
        let client = MessagingClient::new(config.origin.clone(), keyset, &transport)?;
        Ok(Self::with_remote(config, client))
    }
}

impl<C: RemoteMessaging> DataManager<C> {
    /// Build a manager around an injected remote-messaging
    /// implementation.
    pub fn with_remote(config: ManagerConfig, remote: C) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                remote,
                store: PushStore::new(),
                listeners: ListenerSet::new(),
                cancel: CancellationToken::new(),
                bridge_task: Mutex::new(None),
            }),
        }
    }

    /// Access the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    // ── Push-notification information ────────────────────────────────

    /// Check whether the application is ready for push notifications:
    /// true iff a non-empty device push token is stored. Pure query.
    pub fn is_enabled_for_push(&self) -> bool {
        self.inner.store.has_token()
    }

    /// Store or replace the device push token received from the platform
    /// registration flow. Subsequent enable operations become permitted.
    pub fn set_device_push_token(&self, token: impl Into<Bytes>) {
        let token = DeviceToken::new(token);
        debug!(token = %token, "device push token updated");
        self.inner.store.set_token(token);
    }

    /// Enable push notifications on the default channel.
    ///
    /// Fails locally (no network call) when no token is stored. On
    /// success the default channel joins the enabled set, and listeners
    /// hear `enabled_for_push` the first time this succeeds for the
    /// current token. On any failure listeners hear `push_enable_failed`
    /// and state is left unchanged.
    pub async fn enable_push(&self) -> Result<(), CoreError> {
        let Some(token) = self.inner.store.token_hex() else {
            self.inner.listeners.notify_enable_failed();
            return Err(CoreError::MissingDeviceToken);
        };

        let channel = self.inner.config.default_channel.as_str();
        match self.inner.remote.register_for_push(&token, &[channel]).await {
            Ok(()) => {
                self.inner.store.insert_channel(channel);
                if self.inner.store.mark_announced() {
                    info!(%channel, "push notifications enabled");
                    self.inner.listeners.notify_enabled();
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "push enable failed");
                self.inner.listeners.notify_enable_failed();
                Err(e.into())
            }
        }
    }

    /// Disable push notifications on the default channel. Removes it
    /// from the enabled set on success; fails locally without a token.
    pub async fn disable_push(&self) -> Result<(), CoreError> {
        let token = self.require_token()?;
        let channel = self.inner.config.default_channel.as_str();

        self.inner
            .remote
            .unregister_from_push(&token, &[channel])
            .await?;
        self.inner.store.remove_channel(channel);
        info!(%channel, "push notifications disabled");
        Ok(())
    }

    /// Disable push notifications on every channel at once. Clears the
    /// enabled set on success.
    pub async fn disable_all_push(&self) -> Result<(), CoreError> {
        let token = self.require_token()?;

        self.inner.remote.unregister_from_all_push(&token).await?;
        self.inner.store.clear_channels();
        info!("push notifications disabled on all channels");
        Ok(())
    }

    /// Audit push-enabled channels against the network's authoritative
    /// state. On success the local set is replaced wholesale with the
    /// returned list, which is also handed back to the caller.
    pub async fn audit_push(&self) -> Result<Vec<String>, CoreError> {
        let token = self.require_token()?;

        let channels = self.inner.remote.audit_push(&token).await?;
        self.inner.store.replace_channels(channels.iter().cloned());
        debug!(count = channels.len(), "push audit complete");
        Ok(channels)
    }

    // ── Publish ──────────────────────────────────────────────────────

    /// Send a message to a channel over the real-time network.
    ///
    /// No token is required; the only local precondition is a non-empty
    /// channel name.
    pub async fn send_message(&self, message: &str, channel: &str) -> Result<(), CoreError> {
        Self::require_channel(channel)?;

        let timetoken = self
            .inner
            .remote
            .publish(channel, &serde_json::Value::String(message.to_owned()))
            .await?;
        debug!(%channel, %timetoken, "message published");
        Ok(())
    }

    /// Send a message with a mobile push payload attached, so offline
    /// devices registered on the channel receive it as a push
    /// notification.
    pub async fn send_push_message(
        &self,
        message: &str,
        channel: &str,
        push_payload: serde_json::Value,
    ) -> Result<(), CoreError> {
        Self::require_channel(channel)?;

        let body = serde_json::json!({
            "text": message,
            "pn_apns": push_payload,
        });
        let timetoken = self.inner.remote.publish(channel, &body).await?;
        debug!(%channel, %timetoken, "push message published");
        Ok(())
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Register a listener for manager state changes and inbound
    /// messages. Idempotent; the manager keeps a weak reference only.
    pub fn add_listener(&self, listener: &Arc<dyn DataManagerListener>) {
        self.inner.listeners.add(listener);
    }

    /// Deregister a listener. Idempotent; once this returns the listener
    /// receives no further callbacks.
    pub fn remove_listener(&self, listener: &Arc<dyn DataManagerListener>) {
        self.inner.listeners.remove(listener);
    }

    // ── Real-time stream lifecycle ───────────────────────────────────

    /// Start the real-time subscription on the default channel and spawn
    /// the bridge task that fans inbound messages out to listeners.
    ///
    /// Calling this more than once is a no-op while the bridge is
    /// running.
    pub fn connect(&self) {
        let mut slot = self
            .inner
            .bridge_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!("already connected");
            return;
        }

        let rx = self.inner.remote.subscribe(
            vec![self.inner.config.default_channel.clone()],
            self.inner.config.reconnect.clone(),
            self.inner.cancel.child_token(),
        );

        let inner = Arc::clone(&self.inner);
        let cancel = self.inner.cancel.child_token();
        *slot = Some(tokio::spawn(bridge_task(inner, rx, cancel)));
        info!(channel = %self.inner.config.default_channel, "real-time stream connected");
    }

    /// Tear down the subscription and the bridge task. Listener
    /// callbacks are not guaranteed after this returns.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .bridge_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        debug!("data manager shut down");
    }

    // ── State observation ────────────────────────────────────────────

    /// Current snapshot of the push-enabled channel set.
    pub fn channels_snapshot(&self) -> Arc<std::collections::BTreeSet<String>> {
        self.inner.store.snapshot()
    }

    /// Subscribe to channel-set changes.
    pub fn channels(&self) -> watch::Receiver<Arc<std::collections::BTreeSet<String>>> {
        self.inner.store.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn require_token(&self) -> Result<String, CoreError> {
        self.inner
            .store
            .token_hex()
            .ok_or(CoreError::MissingDeviceToken)
    }

    fn require_channel(channel: &str) -> Result<(), CoreError> {
        if channel.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "channel name must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ── Bridge task: remote stream → listener fan-out ────────────────────

async fn bridge_task<C: RemoteMessaging>(
    inner: Arc<ManagerInner<C>>,
    mut rx: broadcast::Receiver<Arc<pushme_api::InboundMessage>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        debug!(channel = %message.channel, "inbound message");
                        inner.listeners.notify_message(&message);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "listener bridge lagged behind stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
