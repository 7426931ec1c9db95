use thiserror::Error;

/// Top-level error type for the `pushme-api` crate.
///
/// Covers every failure mode across the REST surface: key rejection,
/// transport, publish, push-registration, and the subscribe long-poll.
/// `pushme-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Keys ────────────────────────────────────────────────────────
    /// Publish or subscribe key rejected by the network.
    #[error("Key rejected by network: {message}")]
    InvalidKey { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Publish ─────────────────────────────────────────────────────
    /// The network rejected a publish (parsed from the `[0, "desc", tt]`
    /// status triple).
    #[error("Publish rejected: {message}")]
    Publish { message: String },

    // ── Push registration ───────────────────────────────────────────
    /// Push-registration endpoint returned a non-success status.
    #[error("Push registration failed (HTTP {status}): {message}")]
    Push { message: String, status: u16 },

    // ── Subscribe ───────────────────────────────────────────────────
    /// Subscribe long-poll failed to connect or dropped mid-cycle.
    #[error("Subscribe connection failed: {0}")]
    SubscribeConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::SubscribeConnect(_) => true,
            Self::Push { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the network rejected our keys (not recoverable
    /// without reconfiguration).
    pub fn is_key_rejection(&self) -> bool {
        matches!(self, Self::InvalidKey { .. })
    }
}
