//! Adafruit STEMMA capacitive soil sensor (seesaw firmware, touch channel 0).
//!
//! The sensor is slow to settle, so it is polled at most once per configured
//! interval and reports `OkNoData` in between. The cache in
//! [`ManagedSensor`](super::ManagedSensor) carries the last value across
//! those idle cycles.

use core::fmt;
use core::time::Duration;

use log::{debug, info, warn};

use super::{SENSOR_DATA_BUFFER_SIZE, SensorDriver, SensorStatus, SensorType};
use crate::app::ports::TimeSource;
use crate::bus::{BusDriver, I2cInterface};
use crate::error::{Result, SensorError};
use crate::time::Instant;

pub const SOIL_I2C_ADDRESS: u8 = 0x36;

const STATUS_BASE: u8 = 0x00;
const STATUS_HW_ID: u8 = 0x01;
const STATUS_SWRST: u8 = 0x7F;
const TOUCH_BASE: u8 = 0x0F;
const TOUCH_CHANNEL_OFFSET: u8 = 0x10;

const SEESAW_HW_ID: u8 = 0x55;
/// Returned by the touch channel while a conversion is still running.
const TOUCH_NOT_READY: u16 = 0xFFFF;

const HW_ID_READ_DELAY_MS: u16 = 1;
const TOUCH_READ_DELAY_MS: u16 = 5;
const RESET_SETTLE_MS: u32 = 500;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Decode a cached soil reading (`u16` little-endian).
pub fn moisture_from_bytes(data: &[u8]) -> Option<u16> {
    match data {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

pub struct SoilDriver<B, T> {
    bus: I2cInterface<B, T>,
    poll_interval: Duration,
    next_poll: Option<Instant>,
    initialized: bool,
}

impl<B: BusDriver, T: TimeSource> SoilDriver<B, T> {
    pub fn new(bus: I2cInterface<B, T>, poll_interval: Duration) -> Self {
        Self {
            bus,
            poll_interval,
            next_poll: None,
            initialized: false,
        }
    }

    pub fn bus(&self) -> &I2cInterface<B, T> {
        &self.bus
    }

    fn check_hw_id(&mut self) -> Result<()> {
        let mut id = [0u8; 1];
        self.bus
            .read_from_i2c_register(
                SOIL_I2C_ADDRESS,
                STATUS_BASE,
                STATUS_HW_ID,
                &mut id,
                HW_ID_READ_DELAY_MS,
            )
            .into_result()?;
        if id[0] != SEESAW_HW_ID {
            return Err(SensorError::UnexpectedDevice.into());
        }
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<()> {
        self.bus
            .write_to_i2c_register(SOIL_I2C_ADDRESS, STATUS_BASE, STATUS_SWRST, &[0xFF])
            .into_result()?;
        self.bus.delay_ms(RESET_SETTLE_MS);
        Ok(())
    }

    fn read_touch(&mut self) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.bus
            .read_from_i2c_register(
                SOIL_I2C_ADDRESS,
                TOUCH_BASE,
                TOUCH_CHANNEL_OFFSET,
                &mut raw,
                TOUCH_READ_DELAY_MS,
            )
            .into_result()?;
        Ok(u16::from_be_bytes(raw))
    }
}

impl<B: BusDriver, T: TimeSource> SensorDriver for SoilDriver<B, T> {
    const SENSOR_TYPE: SensorType = SensorType::SoilMoisture;

    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
        let moisture = moisture_from_bytes(data).ok_or(fmt::Error)?;
        write!(out, "{{\"Soil Moisture\":{}}}", moisture)
    }

    fn initialize(&mut self, _now: Instant) -> bool {
        self.bus.init_sensor_bus();
        self.next_poll = None;
        self.initialized = match self.check_hw_id() {
            Ok(()) => {
                info!("soil: seesaw found at 0x{:02X}", SOIL_I2C_ADDRESS);
                true
            }
            Err(e) => {
                warn!("soil: detection failed ({})", e);
                false
            }
        };
        self.initialized
    }

    fn reset(&mut self) {
        warn!("soil: resetting sensor");
        self.bus.reset_sensor_bus();
        let result = self.soft_reset().and_then(|()| self.check_hw_id());
        if let Err(e) = result {
            warn!("soil: reset did not recover sensor ({})", e);
        }
        self.next_poll = None;
    }

    fn shutdown(&mut self) {
        self.bus.shutdown_sensor_bus();
        self.initialized = false;
    }

    fn update_raw(
        &mut self,
        now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize) {
        if !self.initialized {
            return (SensorStatus::Inactive, 0);
        }
        self.bus.check_interface_watchdog();

        if self.next_poll.is_some_and(|t| now < t) {
            return (SensorStatus::OkNoData, 0);
        }
        self.next_poll = Some(now + self.poll_interval);

        match self.read_touch() {
            Ok(TOUCH_NOT_READY) => (SensorStatus::OkNoData, 0),
            Ok(moisture) => {
                out[..2].copy_from_slice(&moisture.to_le_bytes());
                (SensorStatus::Ok, 2)
            }
            Err(e) => {
                debug!("soil: touch read failed ({})", e);
                (SensorStatus::Malfunctioning, 0)
            }
        }
    }
}
