// ── Core error types ──
//
// User-facing errors from pushme-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<pushme_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants. Every failure an async operation can
// report travels through this type; the `Display` rendering is the
// human-readable description handed to the UI.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local precondition failures ──────────────────────────────────
    /// A push operation was attempted before a device token was stored.
    /// Reported without any network call.
    #[error("No device push token stored: register for remote notifications first")]
    MissingDeviceToken,

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Remote-network failures ──────────────────────────────────────
    #[error("Cannot reach messaging network: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request rejected by messaging network: {message}")]
    Rejected { message: String },

    #[error("Messaging network error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pushme_api::Error> for CoreError {
    fn from(err: pushme_api::Error) -> Self {
        match err {
            pushme_api::Error::InvalidKey { message } => CoreError::Rejected { message },
            pushme_api::Error::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            pushme_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            pushme_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            pushme_api::Error::Publish { message } => CoreError::Rejected { message },
            pushme_api::Error::Push { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            pushme_api::Error::SubscribeConnect(reason) => CoreError::ConnectionFailed { reason },
            pushme_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
