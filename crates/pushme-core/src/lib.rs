//! Data-management layer between `pushme-api` and UI consumers.
//!
//! This crate owns the device-registration state and the listener
//! relationship for the push-notification workspace:
//!
//! - **[`DataManager`]** — Central broker between UI intent and the remote
//!   messaging network. Owns the device push token and the set of
//!   push-enabled channels, exposes async enable/disable/audit/publish
//!   operations, and fans inbound real-time messages out to listeners.
//!
//! - **[`DataManagerListener`]** — The capability contract a consumer
//!   implements to hear about push enablement and inbound messages.
//!
//! - **[`RemoteMessaging`]** — The consumed contract of the remote network
//!   (publish, subscribe, push-channel registration). Implemented for
//!   [`pushme_api::MessagingClient`]; test doubles implement it directly.
//!
//! - **[`PushStore`]** — Token + channel-set bookkeeping under a single
//!   critical section, with a `watch` snapshot channel for reactive reads.

pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod remote;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ManagerConfig, TlsVerification};
pub use error::CoreError;
pub use listener::DataManagerListener;
pub use manager::DataManager;
pub use remote::RemoteMessaging;
pub use store::{DeviceToken, PushStore};

// Re-export the inbound message type so consumers don't need a direct
// pushme-api dependency for the listener callback signature.
pub use pushme_api::InboundMessage;
