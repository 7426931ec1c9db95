// Messaging network HTTP client
//
// Wraps `reqwest::Client` with network-specific URL construction and
// response unwrapping. Publish results arrive as a `[status, info,
// timetoken]` triple, push-registration results as either a status pair
// or a bare channel array; both envelopes are stripped before the caller
// sees them.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Publish/subscribe key pair identifying the application on the network.
#[derive(Debug, Clone)]
pub struct Keyset {
    pub publish_key: String,
    pub subscribe_key: String,
}

/// Raw HTTP client for the real-time messaging network's REST surface.
///
/// Handles publish, push-notification-channel registration (add, remove,
/// remove-all, audit), and the subscribe long-poll primitive used by
/// [`SubscribeHandle`](crate::subscribe::SubscribeHandle).
///
/// Cheaply cloneable -- the underlying `reqwest::Client` is an `Arc`.
#[derive(Clone)]
pub struct MessagingClient {
    http: reqwest::Client,
    origin: Url,
    keyset: Keyset,
    /// Client instance identifier, sent as the `uuid` query parameter on
    /// every request so the network can attribute traffic.
    instance_id: String,
}

impl MessagingClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// The `origin` should be the network's REST root
    /// (e.g. `https://ps.pndsn.com`).
    pub fn new(origin: Url, keyset: Keyset, transport: &TransportConfig) -> Result<Self, Error> {
        if origin.cannot_be_a_base() {
            return Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithoutBase));
        }
        let http = transport.build_client()?;
        Ok(Self::with_client(http, origin, keyset))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, origin: Url, keyset: Keyset) -> Self {
        Self {
            http,
            origin,
            keyset,
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The network origin this client talks to.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// The subscribe key in use.
    pub fn subscribe_key(&self) -> &str {
        &self.keyset.subscribe_key
    }

    /// The client instance identifier.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a request URL from path segments, percent-encoding each one.
    ///
    /// Segment-wise construction keeps `/` inside a JSON payload segment
    /// from splitting the path.
    pub(crate) fn request_url(&self, segments: &[&str]) -> Url {
        let mut url = self.origin.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("uuid", &self.instance_id);
        url
    }

    // ── Publish ──────────────────────────────────────────────────────

    /// Publish a JSON message to a channel. Returns the publish timetoken.
    ///
    /// The message travels in the URL path (the network's GET publish
    /// form). The response is a `[status, info, timetoken]` triple --
    /// `status == 1` means accepted, anything else carries a rejection
    /// description in `info`.
    pub async fn publish(&self, channel: &str, message: &Value) -> Result<String, Error> {
        let body = serde_json::to_string(message).map_err(|e| Error::Deserialization {
            message: format!("unserializable message: {e}"),
            body: String::new(),
        })?;

        let url = self.request_url(&[
            "publish",
            &self.keyset.publish_key,
            &self.keyset.subscribe_key,
            "0",
            channel,
            "0",
            &body,
        ]);
        debug!(%channel, "GET publish");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(classify_http_error(status.as_u16(), &text, ErrorSurface::Publish));
        }

        let (code, info, timetoken): (i64, String, String) =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;

        if code == 1 {
            Ok(timetoken)
        } else {
            Err(Error::Publish { message: info })
        }
    }

    // ── Push-notification channel registration ───────────────────────

    /// Enable push delivery for `token` on the given channels.
    pub async fn register_for_push(&self, token: &str, channels: &[&str]) -> Result<(), Error> {
        self.modify_push_channels(token, Some(channels), None).await
    }

    /// Disable push delivery for `token` on the given channels.
    pub async fn unregister_from_push(&self, token: &str, channels: &[&str]) -> Result<(), Error> {
        self.modify_push_channels(token, None, Some(channels)).await
    }

    /// Disable push delivery for `token` on every channel at once.
    pub async fn unregister_from_all_push(&self, token: &str) -> Result<(), Error> {
        let url = self.device_url(token, &["remove"]);
        debug!("GET push remove-device");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        self.check_push_response(resp).await.map(|_| ())
    }

    /// Fetch the authoritative list of channels push-enabled for `token`.
    pub async fn audit_push(&self, token: &str) -> Result<Vec<String>, Error> {
        let url = self.device_url(token, &[]);
        debug!("GET push audit");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let body = self.check_push_response(resp).await?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Shared add/remove request against the device registration endpoint.
    async fn modify_push_channels(
        &self,
        token: &str,
        add: Option<&[&str]>,
        remove: Option<&[&str]>,
    ) -> Result<(), Error> {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(channels) = add {
            pairs.push(("add", channels.join(",")));
        }
        if let Some(channels) = remove {
            pairs.push(("remove", channels.join(",")));
        }

        let mut url = self.device_url(token, &[]);
        for (key, value) in &pairs {
            url.query_pairs_mut().append_pair(key, value);
        }
        debug!(add = ?add, remove = ?remove, "GET push modify");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        self.check_push_response(resp).await.map(|_| ())
    }

    /// Build `{origin}/v1/push/sub-key/{sub}/devices/{token}[/extra...]`
    /// with the APNS gateway type pinned.
    fn device_url(&self, token: &str, extra: &[&str]) -> Url {
        let mut segments = vec![
            "v1",
            "push",
            "sub-key",
            self.keyset.subscribe_key.as_str(),
            "devices",
            token,
        ];
        segments.extend_from_slice(extra);
        let mut url = self.request_url(&segments);
        url.query_pairs_mut().append_pair("type", "apns");
        url
    }

    /// Map a push-endpoint response to its body, or a classified error.
    async fn check_push_response(&self, resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_http_error(status.as_u16(), &body, ErrorSurface::Push))
        }
    }

    // ── Subscribe (single long-poll cycle) ───────────────────────────

    /// Issue one subscribe long-poll against the given channels.
    ///
    /// Used by the reconnecting loop in [`crate::subscribe`]; `timetoken`
    /// and `region` form the cursor returned by the previous cycle
    /// (`"0"` / `None` for the initial handshake).
    pub(crate) async fn subscribe_once(
        &self,
        channels: &str,
        timetoken: &str,
        region: Option<u32>,
        poll_timeout: std::time::Duration,
    ) -> Result<crate::subscribe::SubscribeEnvelope, Error> {
        let mut url = self.request_url(&[
            "v2",
            "subscribe",
            &self.keyset.subscribe_key,
            channels,
            "0",
        ]);
        url.query_pairs_mut().append_pair("tt", timetoken);
        if let Some(r) = region {
            url.query_pairs_mut().append_pair("tr", &r.to_string());
        }

        let resp = self
            .http
            .get(url)
            // Long-poll cycles are held open far beyond the transport's
            // default request timeout.
            .timeout(poll_timeout)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(classify_http_error(
                status.as_u16(),
                &body,
                ErrorSurface::Subscribe,
            ));
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

// ── HTTP error classification ────────────────────────────────────────

#[derive(Clone, Copy)]
enum ErrorSurface {
    Publish,
    Push,
    Subscribe,
}

/// Turn a non-2xx response into the right error variant.
///
/// Key rejections (400/401/403) surface as [`Error::InvalidKey`] no
/// matter which endpoint produced them; everything else maps to the
/// endpoint's own variant.
fn classify_http_error(status: u16, body: &str, surface: ErrorSurface) -> Error {
    let message = extract_error_message(body).unwrap_or_else(|| format!("HTTP {status}"));

    if matches!(status, 400 | 401 | 403) {
        return Error::InvalidKey { message };
    }

    match surface {
        ErrorSurface::Publish => Error::Publish { message },
        ErrorSurface::Push => Error::Push { message, status },
        ErrorSurface::Subscribe => Error::SubscribeConnect(message),
    }
}

/// Pull a human-readable description out of an error body.
///
/// The network is inconsistent here: object bodies carry `"message"` or
/// `"error"`, publish failures use the `[0, "desc", tt]` triple, and
/// some endpoints return a bare string.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items.get(1).and_then(Value::as_str).map(String::from),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
