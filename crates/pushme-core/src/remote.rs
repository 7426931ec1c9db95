// ── Remote messaging contract ──
//
// The consumed surface of the real-time messaging network: publish,
// subscribe, and push-notification-channel registration. The production
// implementation is `pushme_api::MessagingClient`; tests substitute an
// in-process double. The `DataManager` is generic over this trait so the
// dependency is injected explicitly.

use std::future::Future;
use std::sync::Arc;

use pushme_api::{Error, InboundMessage, MessagingClient, ReconnectConfig, SubscribeHandle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Publish, subscribe, and push-registration primitives of the remote
/// network. Each result is success-with-payload or failure-with-
/// description, surfaced as [`pushme_api::Error`].
pub trait RemoteMessaging: Send + Sync + 'static {
    /// Enable push delivery for the device token on the given channels.
    fn register_for_push(
        &self,
        token: &str,
        channels: &[&str],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Disable push delivery for the device token on the given channels.
    fn unregister_from_push(
        &self,
        token: &str,
        channels: &[&str],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Disable push delivery for the device token everywhere.
    fn unregister_from_all_push(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetch the authoritative list of push-enabled channels for the
    /// device token.
    fn audit_push(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Publish a JSON message to a channel. Returns the publish
    /// timetoken.
    fn publish(
        &self,
        channel: &str,
        message: &serde_json::Value,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    /// Start streaming inbound messages for the given channels until
    /// `cancel` fires.
    fn subscribe(
        &self,
        channels: Vec<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> broadcast::Receiver<Arc<InboundMessage>>;
}

impl RemoteMessaging for MessagingClient {
    async fn register_for_push(&self, token: &str, channels: &[&str]) -> Result<(), Error> {
        MessagingClient::register_for_push(self, token, channels).await
    }

    async fn unregister_from_push(&self, token: &str, channels: &[&str]) -> Result<(), Error> {
        MessagingClient::unregister_from_push(self, token, channels).await
    }

    async fn unregister_from_all_push(&self, token: &str) -> Result<(), Error> {
        MessagingClient::unregister_from_all_push(self, token).await
    }

    async fn audit_push(&self, token: &str) -> Result<Vec<String>, Error> {
        MessagingClient::audit_push(self, token).await
    }

    async fn publish(&self, channel: &str, message: &serde_json::Value) -> Result<String, Error> {
        MessagingClient::publish(self, channel, message).await
    }

    fn subscribe(
        &self,
        channels: Vec<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> broadcast::Receiver<Arc<InboundMessage>> {
        SubscribeHandle::start(self.clone(), channels, reconnect, cancel).subscribe()
    }
}
