//! Sensor abstraction: one cache + watchdog state machine shared by every
//! concrete sensor.
//!
//! ```text
//!   SensorDriver (scd30 / soil / sonar)      hardware step only
//!          │ update_raw(now) → (status, bytes)
//!          ▼
//!   ManagedSensor<D>                          cache, expiry, watchdog
//!          │ dyn Sensor
//!          ▼
//!   SensorGroup                               aggregate per cycle
//! ```
//!
//! | Status reported   | Cache                          | Watchdog              |
//! |-------------------|--------------------------------|-----------------------|
//! | `Ok`              | replaced, expires `now + 5 s`  | rearmed `now + 15 s`  |
//! | `OkNoData`        | kept until expiry, then empty  | rearmed               |
//! | `Malfunctioning`  | emptied                        | lapsed ⇒ reset+rearm  |
//! | `Inactive`        | emptied                        | untouched             |
//!
//! Drivers never reset themselves and callers never reset sensors; the
//! state machine is the only caller of [`SensorDriver::reset`].

pub mod group;
pub mod registry;
pub mod scd30;
pub mod soil;
pub mod sonar;

use core::fmt;
use core::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::time::{Instant, deadline_passed};
use registry::SerializerRegistry;

pub const SENSOR_DATA_BUFFER_SIZE: usize = 64;
/// Cached data stays valid this long after the last fresh reading.
pub const SENSOR_DATA_CACHE_TIME: Duration = Duration::from_secs(5);
/// A sensor erroring for this long is reset.
pub const UPDATE_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(15);

/// Raw bytes of one reading.
pub type SensorData = heapless::Vec<u8, SENSOR_DATA_BUFFER_SIZE>;

// ── Status & identity ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorStatus {
    Ok = 0,
    OkNoData = 1,
    Inactive = 2,
    Malfunctioning = 3,
}

impl SensorStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::OkNoData => "OK (no data)",
            Self::Inactive => "INACTIVE",
            Self::Malfunctioning => "MALFUNCTIONING",
        }
    }
}

/// Per-kind type tag, unique per concrete sensor. Keys the serializer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorType {
    Scd30 = 1,
    SoilMoisture = 2,
    Sonar = 3,
}

impl SensorType {
    /// Topic segment used when publishing per-sensor readings.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scd30 => "scd30",
            Self::SoilMoisture => "soil",
            Self::Sonar => "sonar",
        }
    }
}

// ── Commands ──────────────────────────────────────────────────

/// A decoded control command addressed to one sensor kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorCommand {
    /// Temperature compensation offset, °C.
    SetTemperatureOffset(f32),
    /// Forced recalibration reference, ppm CO2.
    SetForcedRecalibration(u16),
}

impl SensorCommand {
    pub fn target(&self) -> SensorType {
        match self {
            Self::SetTemperatureOffset(_) | Self::SetForcedRecalibration(_) => SensorType::Scd30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// The sensor understood the command but could not apply it.
    Rejected,
    /// No sensor in the group handles this command.
    NotSupported,
}

// ── Driver contract ───────────────────────────────────────────

/// Hardware step of a concrete sensor.
///
/// Implementations only talk to the device. Caching, expiry and fault
/// escalation are handled once by [`ManagedSensor`].
pub trait SensorDriver {
    const SENSOR_TYPE: SensorType;

    /// Render one cached reading as a JSON object.
    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result;

    /// Bring the device up. `false` leaves the sensor inactive.
    fn initialize(&mut self, now: Instant) -> bool;

    /// Bounce the hardware after sustained failure.
    fn reset(&mut self);

    fn shutdown(&mut self);

    /// Poll the device. Fresh data goes into `out`; the returned length is
    /// only meaningful with [`SensorStatus::Ok`].
    fn update_raw(
        &mut self,
        now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize);

    fn handle_command(&mut self, _command: &SensorCommand) -> CommandOutcome {
        CommandOutcome::NotSupported
    }
}

// ── Cached state ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDataBuffer {
    pub status: SensorStatus,
    pub data: SensorData,
    pub expiry: Option<Instant>,
}

impl Default for SensorDataBuffer {
    fn default() -> Self {
        Self {
            status: SensorStatus::Inactive,
            data: SensorData::new(),
            expiry: None,
        }
    }
}

impl SensorDataBuffer {
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

// ── Object-safe view used by the group ────────────────────────

pub trait Sensor {
    fn sensor_type(&self) -> SensorType;

    fn initialize(&mut self, now: Instant) -> bool;

    fn shutdown(&mut self);

    fn update(&mut self, now: Instant);

    fn cached_data(&self) -> &SensorDataBuffer;

    fn handle_command(&mut self, command: &SensorCommand) -> CommandOutcome;

    fn status(&self) -> SensorStatus {
        self.cached_data().status
    }

    /// Alive, whether or not it produced data this cycle.
    fn is_active(&self) -> bool {
        matches!(self.status(), SensorStatus::Ok | SensorStatus::OkNoData)
    }

    fn has_data(&self) -> bool {
        self.cached_data().has_data()
    }
}

/// A driver plus the shared cache/watchdog state machine.
pub struct ManagedSensor<D> {
    driver: D,
    cache: SensorDataBuffer,
    watchdog: Option<Instant>,
    reset_count: u32,
}

impl<D: SensorDriver> ManagedSensor<D> {
    /// Wrap `driver` and register its serializer.
    pub fn new(driver: D, registry: &mut SerializerRegistry) -> Self {
        if !registry.register(D::SENSOR_TYPE, D::serialize_json) {
            warn!("serializer registry full, {:?} readings will not serialize", D::SENSOR_TYPE);
        }
        Self {
            driver,
            cache: SensorDataBuffer::default(),
            watchdog: None,
            reset_count: 0,
        }
    }

    /// Resets performed by the watchdog since construction.
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn rearm_watchdog(&mut self, now: Instant) {
        self.watchdog = Some(now + UPDATE_WATCHDOG_TIMEOUT);
    }
}

impl<D: SensorDriver> Sensor for ManagedSensor<D> {
    fn sensor_type(&self) -> SensorType {
        D::SENSOR_TYPE
    }

    fn initialize(&mut self, now: Instant) -> bool {
        let ok = self.driver.initialize(now);
        if ok {
            self.rearm_watchdog(now);
        } else {
            warn!("{:?}: initialisation failed", D::SENSOR_TYPE);
        }
        ok
    }

    fn shutdown(&mut self) {
        self.driver.shutdown();
        self.cache = SensorDataBuffer::default();
        self.watchdog = None;
    }

    fn update(&mut self, now: Instant) {
        let mut scratch = [0u8; SENSOR_DATA_BUFFER_SIZE];
        let (status, len) = self.driver.update_raw(now, &mut scratch);
        self.cache.status = status;

        match status {
            SensorStatus::Ok => {
                self.cache.data.clear();
                // Length is clamped to the scratch buffer, so this cannot overflow.
                let _ = self
                    .cache
                    .data
                    .extend_from_slice(&scratch[..len.min(SENSOR_DATA_BUFFER_SIZE)]);
                self.cache.expiry = Some(now + SENSOR_DATA_CACHE_TIME);
                self.rearm_watchdog(now);
            }
            SensorStatus::OkNoData => {
                if deadline_passed(self.cache.expiry, now) {
                    self.cache.data.clear();
                    self.cache.expiry = None;
                }
                self.rearm_watchdog(now);
            }
            SensorStatus::Malfunctioning => {
                match self.watchdog {
                    Some(deadline) if now.is_past(deadline) => {
                        warn!("{:?}: unresponsive, resetting sensor", D::SENSOR_TYPE);
                        self.driver.reset();
                        self.reset_count = self.reset_count.wrapping_add(1);
                        self.rearm_watchdog(now);
                    }
                    None => self.rearm_watchdog(now),
                    Some(_) => {}
                }
                self.cache.data.clear();
            }
            SensorStatus::Inactive => {
                self.cache.data.clear();
            }
        }
    }

    fn cached_data(&self) -> &SensorDataBuffer {
        &self.cache
    }

    fn handle_command(&mut self, command: &SensorCommand) -> CommandOutcome {
        self.driver.handle_command(command)
    }
}
