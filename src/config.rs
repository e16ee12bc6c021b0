//! Pod configuration parameters
//!
//! Everything a deployment may tune without reflashing. The blob is
//! persisted by [`ConfigPort`](crate::app::ports::ConfigPort)
//! implementations; this module only defines its content and checks it.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::bus::BusConfig;

pub type Name = heapless::String<32>;

/// Core pod configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodConfig {
    // --- Identity ---
    /// Topic segment naming where the pod is installed
    pub location: Name,
    /// Topic segment naming the pod itself
    pub sensor_name: Name,

    // --- Calibration ---
    /// SCD30 temperature compensation (°C), applied at start-up
    pub scd30_temperature_offset_c: Option<f32>,
    /// Soil sensor poll interval (milliseconds)
    pub soil_poll_interval_ms: u32,

    // --- Timing ---
    /// Hardware-core loop period (milliseconds)
    pub sensor_loop_interval_ms: u32,
    /// Network-core loop period (milliseconds)
    pub network_loop_interval_ms: u32,

    // --- Bus ---
    /// Bound on one I2C transaction (milliseconds)
    pub i2c_timeout_ms: u32,
    /// Idle time before the bus is torn down and rebuilt (milliseconds)
    pub i2c_watchdog_timeout_ms: u32,

    // --- Publishing ---
    /// Also publish each sensor's reading on its own topic
    pub per_sensor_topics: bool,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            location: Name::try_from("greenhouse").unwrap_or_default(),
            sensor_name: Name::try_from("sensorpod").unwrap_or_default(),

            scd30_temperature_offset_c: None,
            soil_poll_interval_ms: 2_000,

            sensor_loop_interval_ms: 500,
            network_loop_interval_ms: 100,

            i2c_timeout_ms: 250,
            i2c_watchdog_timeout_ms: 10_000,

            per_sensor_topics: false,
        }
    }
}

impl PodConfig {
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::IoError)
    }

    /// Parse a JSON document, as pasted on the console during bring-up.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.is_empty() || self.location.contains('/') {
            return Err(ConfigError::ValidationFailed(
                "location must be non-empty without '/'",
            ));
        }
        if self.sensor_name.is_empty() || self.sensor_name.contains('/') {
            return Err(ConfigError::ValidationFailed(
                "sensor_name must be non-empty without '/'",
            ));
        }
        if let Some(offset) = self.scd30_temperature_offset_c {
            if !(0.0..=crate::sensors::scd30::MAX_TEMPERATURE_OFFSET_C).contains(&offset) {
                return Err(ConfigError::ValidationFailed(
                    "scd30_temperature_offset_c must be 0.0–655.35",
                ));
            }
        }
        if !(100..=3_600_000).contains(&self.soil_poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "soil_poll_interval_ms must be 100–3600000",
            ));
        }
        if !(10..=60_000).contains(&self.sensor_loop_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "sensor_loop_interval_ms must be 10–60000",
            ));
        }
        if !(10..=60_000).contains(&self.network_loop_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "network_loop_interval_ms must be 10–60000",
            ));
        }
        if self.i2c_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("i2c_timeout_ms must be > 0"));
        }
        if self.i2c_watchdog_timeout_ms <= self.i2c_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "i2c_watchdog_timeout_ms must exceed i2c_timeout_ms",
            ));
        }
        Ok(())
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            transaction_timeout: Duration::from_millis(u64::from(self.i2c_timeout_ms)),
            watchdog_timeout: Duration::from_millis(u64::from(self.i2c_watchdog_timeout_ms)),
            ..BusConfig::default()
        }
    }

    pub fn soil_poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.soil_poll_interval_ms))
    }
}
