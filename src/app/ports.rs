//! Port traits: the boundary between the pod's domain logic and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Core executors / sensors (domain)
//! ```
//!
//! Bus drivers live in [`crate::bus`] because they sit underneath the
//! sensors rather than beside them. Everything else the domain touches
//! (time, the network link, persisted config, the console) comes in
//! through one of the traits below.

use crate::config::PodConfig;
use crate::messaging::codec::MqttMessage;
use crate::time::Instant;

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic clock plus a blocking delay.
///
/// Sensors and the bus layer take `now` as an argument wherever they can;
/// the delay is only used for the fixed settle times the devices require.
pub trait TimeSource {
    fn now(&self) -> Instant;

    fn delay_us(&mut self, us: u32);

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Network ports (driven adapters: domain ↔ MQTT link)
// ───────────────────────────────────────────────────────────────

/// Outbound half of the network link.
pub trait MessageSink {
    /// Hand a message to the transport. `false` if it was dropped.
    fn publish(&mut self, message: &MqttMessage) -> bool;
}

/// Inbound half of the network link.
pub trait MessageSource {
    /// Next control message received from the broker, if any.
    fn poll(&mut self) -> Option<MqttMessage>;
}

// ───────────────────────────────────────────────────────────────
// Serial port (sonar)
// ───────────────────────────────────────────────────────────────

/// Non-blocking byte reader for a UART receive FIFO.
pub trait SerialRx {
    fn read_byte(&mut self) -> Option<u8>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists the pod configuration.
///
/// Implementations validate before persisting and fall back to
/// [`PodConfig::default()`] when nothing is stored.
pub trait ConfigPort {
    fn load(&self) -> Result<PodConfig, ConfigError>;

    fn save(&self, config: &PodConfig) -> Result<(), ConfigError>;
}

/// Errors returned by [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored blob failed to deserialise.
    Corrupted,
    /// A field is outside its accepted range.
    ValidationFailed(&'static str),
    /// The storage backend failed.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "stored config is corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("stored config is corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::IoError => Self::Config("storage I/O error"),
        }
    }
}
