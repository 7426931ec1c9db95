//! Subscribe long-poll stream with auto-reconnect.
//!
//! Repeatedly polls the network's subscribe endpoint and streams parsed
//! messages through a [`tokio::sync::broadcast`] channel. Handles
//! reconnection with exponential backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use pushme_api::{MessagingClient, ReconnectConfig, SubscribeHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let handle = SubscribeHandle::start(
//!     client,
//!     vec!["news".into()],
//!     ReconnectConfig::default(),
//!     cancel.clone(),
//! );
//! let mut rx = handle.subscribe();
//!
//! while let Ok(message) = rx.recv().await {
//!     println!("{}: {}", message.channel, message.payload);
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::MessagingClient;

// ── Broadcast channel capacity ───────────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

/// How long a single long-poll cycle may be held open by the server.
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(310);

// ── InboundMessage ───────────────────────────────────────────────────

/// A message delivered over a subscribed channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel the message arrived on.
    pub channel: String,

    /// Arbitrary JSON payload -- the network imposes no schema.
    pub payload: serde_json::Value,

    /// Publish timetoken, when the server included one.
    pub timetoken: Option<String>,
}

// ── Wire envelope ────────────────────────────────────────────────────

/// Raw envelope returned by one subscribe cycle:
/// `{ "t": { "t": "...", "r": 1 }, "m": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeEnvelope {
    #[serde(rename = "t")]
    pub(crate) cursor: SubscribeCursor,
    #[serde(rename = "m", default)]
    pub(crate) messages: Vec<RawMessage>,
}

/// Cursor carried between long-poll cycles.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeCursor {
    #[serde(rename = "t")]
    pub(crate) timetoken: String,
    #[serde(rename = "r", default)]
    pub(crate) region: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(rename = "c")]
    pub(crate) channel: String,
    #[serde(rename = "d")]
    pub(crate) payload: serde_json::Value,
    #[serde(rename = "p", default)]
    pub(crate) publish_cursor: Option<SubscribeCursor>,
}

impl From<RawMessage> for InboundMessage {
    fn from(raw: RawMessage) -> Self {
        Self {
            channel: raw.channel,
            payload: raw.payload,
            timetoken: raw.publish_cursor.map(|p| p.timetoken),
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for subscribe reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── SubscribeHandle ──────────────────────────────────────────────────

/// Handle to a running subscribe stream.
///
/// Call [`subscribe`](Self::subscribe) to get broadcast receivers and
/// [`shutdown`](Self::shutdown) to tear down the background task.
pub struct SubscribeHandle {
    message_rx: broadcast::Receiver<Arc<InboundMessage>>,
    cancel: CancellationToken,
}

impl SubscribeHandle {
    /// Spawn the long-poll loop against the given channels.
    ///
    /// Returns immediately; the first poll happens asynchronously --
    /// subscribe to the message receiver to start consuming.
    pub fn start(
        client: MessagingClient,
        channels: Vec<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (message_tx, message_rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            poll_loop(client, channels, message_tx, reconnect, task_cancel).await;
        });

        Self { message_rx, cancel }
    }

    /// Get a new broadcast receiver for the message stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<InboundMessage>> {
        self.message_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background long-poll loop ────────────────────────────────────────

/// Main loop: poll → broadcast → poll again; on error, backoff → retry.
async fn poll_loop(
    client: MessagingClient,
    channels: Vec<String>,
    message_tx: broadcast::Sender<Arc<InboundMessage>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let channel_list = channels.join(",");
    let mut timetoken = String::from("0");
    let mut region: Option<u32> = None;
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = client.subscribe_once(&channel_list, &timetoken, region, LONG_POLL_TIMEOUT) => {
                match result {
                    Ok(envelope) => {
                        timetoken = envelope.cursor.timetoken;
                        region = envelope.cursor.region;
                        attempt = 0;
                        broadcast_messages(envelope.messages, &message_tx);
                    }
                    Err(e) if e.is_key_rejection() => {
                        // Reconfiguration required; retrying won't help.
                        tracing::error!(error = %e, "subscribe key rejected, giving up");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "subscribe poll failed");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "subscribe reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before subscribe retry"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    #[allow(unreachable_code)]
    {
        tracing::debug!("subscribe loop exiting");
    }
}

/// Convert raw wire messages and fan them out to subscribers.
fn broadcast_messages(
    messages: Vec<RawMessage>,
    message_tx: &broadcast::Sender<Arc<InboundMessage>>,
) {
    for raw in messages {
        // Ignore send errors -- just means no active subscribers right now
        let _ = message_tx.send(Arc::new(InboundMessage::from(raw)));
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 5.9).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        // Each step should roughly double (within jitter bounds)
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn deserialize_subscribe_envelope() {
        let json = r#"{
            "t": { "t": "17000000000000000", "r": 12 },
            "m": [{
                "c": "news",
                "d": { "text": "hello" },
                "p": { "t": "16999999999999999" }
            }]
        }"#;

        let envelope: SubscribeEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.cursor.timetoken, "17000000000000000");
        assert_eq!(envelope.cursor.region, Some(12));
        assert_eq!(envelope.messages.len(), 1);
        assert_eq!(envelope.messages[0].channel, "news");
    }

    #[test]
    fn deserialize_envelope_without_messages() {
        // A poll cycle that timed out server-side returns only the cursor.
        let json = r#"{ "t": { "t": "17000000000000001" } }"#;

        let envelope: SubscribeEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.cursor.timetoken, "17000000000000001");
        assert!(envelope.cursor.region.is_none());
        assert!(envelope.messages.is_empty());
    }

    #[test]
    fn inbound_message_from_raw() {
        let raw = RawMessage {
            channel: "news".into(),
            payload: serde_json::json!({ "text": "hi" }),
            publish_cursor: Some(SubscribeCursor {
                timetoken: "123".into(),
                region: None,
            }),
        };

        let msg = InboundMessage::from(raw);
        assert_eq!(msg.channel, "news");
        assert_eq!(msg.payload["text"], "hi");
        assert_eq!(msg.timetoken.as_deref(), Some("123"));
    }

    #[test]
    fn broadcast_delivers_all_messages() {
        let (tx, mut rx) = broadcast::channel(16);

        let messages = vec![
            RawMessage {
                channel: "news".into(),
                payload: serde_json::json!("first"),
                publish_cursor: None,
            },
            RawMessage {
                channel: "news".into(),
                payload: serde_json::json!("second"),
                publish_cursor: None,
            },
        ];

        broadcast_messages(messages, &tx);

        assert_eq!(rx.try_recv().unwrap().payload, "first");
        assert_eq!(rx.try_recv().unwrap().payload, "second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_without_subscribers_does_not_panic() {
        let (tx, _) = broadcast::channel::<Arc<InboundMessage>>(16);
        drop(tx.subscribe());

        broadcast_messages(
            vec![RawMessage {
                channel: "news".into(),
                payload: serde_json::json!(null),
                publish_cursor: None,
            }],
            &tx,
        );
    }
}
