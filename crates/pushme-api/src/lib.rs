// pushme-api: Async Rust client for the real-time messaging network
// (publish, subscribe, and push-notification-channel registration).

pub mod client;
pub mod error;
pub mod subscribe;
pub mod transport;

pub use client::{Keyset, MessagingClient};
pub use error::Error;
pub use subscribe::{InboundMessage, ReconnectConfig, SubscribeHandle};
