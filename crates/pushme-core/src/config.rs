// ── Runtime configuration ──
//
// These types describe *how* to reach the remote messaging network.
// They carry key material and connection tuning, but never touch disk.
// The embedding application constructs a `ManagerConfig` and hands it in.

use std::time::Duration;

use pushme_api::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default)]
pub enum TlsVerification {
    /// System CA store (strict). Default for the public network origin.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (local test origins with self-signed certs).
    DangerAcceptInvalid,
}

/// Configuration for one [`DataManager`](crate::DataManager) instance.
///
/// Built by the embedding app, passed to `DataManager` -- core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// REST origin of the messaging network (e.g. `https://ps.pndsn.com`).
    pub origin: Url,
    /// Publish key for the application keyset.
    pub publish_key: SecretString,
    /// Subscribe key for the application keyset.
    pub subscribe_key: SecretString,
    /// Channel used by the default enable/disable operations and the
    /// real-time subscription.
    pub default_channel: String,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout for publish/registration calls. The subscribe
    /// long-poll manages its own, longer timeout.
    pub timeout: Duration,
    /// Backoff tuning for the subscribe stream.
    pub reconnect: ReconnectConfig,
}

impl ManagerConfig {
    /// Construct a config for the given keyset with every knob at its
    /// default.
    pub fn new(publish_key: impl Into<SecretString>, subscribe_key: impl Into<SecretString>) -> Self {
        Self {
            publish_key: publish_key.into(),
            subscribe_key: subscribe_key.into(),
            ..Self::default()
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("https://ps.pndsn.com").expect("static origin URL"),
            publish_key: SecretString::from(String::new()),
            subscribe_key: SecretString::from(String::new()),
            default_channel: "testAPNS".into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}
