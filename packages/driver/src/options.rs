use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;
use zw_logging::Loglevel;

/// The timeouts the transaction engine works with. All configurable, with
/// the protocol's recommended defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    /// How long to wait for the module to ACK a frame
    pub ack: Duration,
    /// How long to wait for a response or callback
    pub reply: Duration,
    /// How long a security nonce handshake may take
    pub security: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ack: Duration::from_millis(1500),
            reply: Duration::from_secs(5),
            security: Duration::from_secs(10),
        }
    }
}

/// Configuration read once at driver start; immutable afterwards
#[derive(Clone, TypedBuilder)]
pub struct DriverOptions {
    #[builder(default = Loglevel::Info)]
    pub log_level: Loglevel,
    #[builder(default = true)]
    pub logging_enabled: bool,
    /// Append to an existing log file instead of truncating it
    #[builder(default = false)]
    pub append_log: bool,
    #[builder(default, setter(into))]
    pub log_file: Option<PathBuf>,
    #[builder(default = Duration::from_secs(30))]
    pub poll_interval: Duration,
    /// Send attempts per message before the failure policy kicks in
    #[builder(default = 3)]
    pub retry_budget: u8,
    /// Consecutive failures before a listening node is probed as failed
    #[builder(default = 3)]
    pub node_dead_threshold: u8,
    /// The 16-byte S0 network key. Without it, secure sends are rejected.
    #[builder(default, setter(into))]
    pub network_key: Option<[u8; 16]>,
    /// Where persisted network state lives
    #[builder(default, setter(into))]
    pub state_path: Option<PathBuf>,
    /// Emit a notification for every completed or dropped transaction
    #[builder(default = false)]
    pub notify_transactions: bool,
    #[builder(default)]
    pub timeouts: Timeouts,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
