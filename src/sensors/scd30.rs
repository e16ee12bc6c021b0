//! Sensirion SCD30 CO2 / temperature / humidity sensor.
//!
//! The SCD30 speaks a command-word protocol: every command is a 16-bit
//! big-endian word, optionally followed by one argument word and its CRC.
//! Responses are sequences of `[msb, lsb, crc]` triples. Readings are IEEE
//! 754 floats split over two words.
//!
//! The sensor sits on the bit-banged bus (it stretches SCL for up to
//! 150 ms) and has a dedicated power-control line, so a reset is a full
//! power cycle rather than a soft reset command.

use core::fmt;

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use super::{CommandOutcome, SENSOR_DATA_BUFFER_SIZE, SensorCommand, SensorDriver, SensorStatus, SensorType};
use crate::app::ports::TimeSource;
use crate::bus::{BusDriver, I2cInterface};
use crate::error::{Result, SensorError};
use crate::time::Instant;

pub const SCD30_I2C_ADDRESS: u8 = 0x61;

const CMD_START_CONTINUOUS_MEASUREMENT: u16 = 0x0010;
const CMD_STOP_CONTINUOUS_MEASUREMENT: u16 = 0x0104;
const CMD_SET_MEASUREMENT_INTERVAL: u16 = 0x4600;
const CMD_GET_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASUREMENT: u16 = 0x0300;
const CMD_SET_TEMPERATURE_OFFSET: u16 = 0x5403;
const CMD_SET_FORCED_RECALIBRATION: u16 = 0x5204;
const CMD_SOFT_RESET: u16 = 0xD304;
const CMD_READ_FIRMWARE_VERSION: u16 = 0xD100;

/// Command-to-read turnaround required by the sensor.
const READ_DELAY_MS: u16 = 3;
const POWER_OFF_MS: u32 = 100;
const BOOT_MS: u32 = 2_000;

pub const DEFAULT_MEASUREMENT_INTERVAL_S: u16 = 2;
pub const FRC_MIN_PPM: u16 = 400;
pub const FRC_MAX_PPM: u16 = 2_000;
/// Largest offset the 16-bit register can hold, in °C.
pub const MAX_TEMPERATURE_OFFSET_C: f32 = 655.35;

/// Cached reading length: three little-endian `f32`.
pub const SCD30_DATA_LEN: usize = 12;

// ── CRC ───────────────────────────────────────────────────────

/// Sensirion CRC-8: polynomial 0x31, init 0xFF, no reflection.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Decode `[msb, lsb, crc]` triples into words, checking every CRC.
fn decode_words<const W: usize>(raw: &[u8]) -> Result<[u16; W]> {
    let mut words = [0u16; W];
    for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(3)) {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(SensorError::CrcMismatch.into());
        }
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(words)
}

// ── Reading ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scd30Reading {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

impl Scd30Reading {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < SCD30_DATA_LEN {
            return None;
        }
        let f = |i: usize| f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Some(Self {
            co2_ppm: f(0),
            temperature_c: f(4),
            humidity_pct: f(8),
        })
    }

    /// NaN or infinity in any field means the sample cannot be published.
    pub fn is_finite(&self) -> bool {
        self.co2_ppm.is_finite() && self.temperature_c.is_finite() && self.humidity_pct.is_finite()
    }

    pub fn to_bytes(&self) -> [u8; SCD30_DATA_LEN] {
        let mut out = [0u8; SCD30_DATA_LEN];
        out[0..4].copy_from_slice(&self.co2_ppm.to_le_bytes());
        out[4..8].copy_from_slice(&self.temperature_c.to_le_bytes());
        out[8..12].copy_from_slice(&self.humidity_pct.to_le_bytes());
        out
    }

    fn from_words(words: &[u16; 6]) -> Self {
        let f = |hi: u16, lo: u16| f32::from_bits((u32::from(hi) << 16) | u32::from(lo));
        Self {
            co2_ppm: f(words[0], words[1]),
            temperature_c: f(words[2], words[3]),
            humidity_pct: f(words[4], words[5]),
        }
    }
}

// ── Driver ────────────────────────────────────────────────────

pub struct Scd30Driver<B, T, P> {
    bus: I2cInterface<B, T>,
    power: P,
    measurement_interval_s: u16,
    temperature_offset_c: Option<f32>,
    initialized: bool,
    /// Lost after a reset; keep reporting a fault so the watchdog retries.
    recovering: bool,
}

impl<B, T, P> Scd30Driver<B, T, P>
where
    B: BusDriver,
    T: TimeSource,
    P: OutputPin,
{
    pub fn new(bus: I2cInterface<B, T>, power: P) -> Self {
        Self {
            bus,
            power,
            measurement_interval_s: DEFAULT_MEASUREMENT_INTERVAL_S,
            temperature_offset_c: None,
            initialized: false,
            recovering: false,
        }
    }

    /// Offset written to the sensor on every (re)initialisation.
    pub fn with_temperature_offset(mut self, offset_c: Option<f32>) -> Self {
        self.temperature_offset_c = offset_c;
        self
    }

    pub fn with_measurement_interval(mut self, seconds: u16) -> Self {
        self.measurement_interval_s = seconds.max(2);
        self
    }

    pub fn bus(&self) -> &I2cInterface<B, T> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut I2cInterface<B, T> {
        &mut self.bus
    }

    // ── protocol helpers ──────────────────────────────────────

    fn send_command(&mut self, command: u16) -> Result<()> {
        let bytes = command.to_be_bytes();
        Ok(self.bus.write_i2c_data(SCD30_I2C_ADDRESS, &bytes).into_result()?)
    }

    fn send_command_with_argument(&mut self, command: u16, argument: u16) -> Result<()> {
        let [hi, lo] = command.to_be_bytes();
        let arg = argument.to_be_bytes();
        let payload = [arg[0], arg[1], crc8(&arg)];
        Ok(self
            .bus
            .write_to_i2c_register(SCD30_I2C_ADDRESS, hi, lo, &payload)
            .into_result()?)
    }

    fn read_words<const W: usize, const RAW: usize>(&mut self, command: u16) -> Result<[u16; W]> {
        let [hi, lo] = command.to_be_bytes();
        let mut raw = [0u8; RAW];
        self.bus
            .read_from_i2c_register(SCD30_I2C_ADDRESS, hi, lo, &mut raw, READ_DELAY_MS)
            .into_result()?;
        decode_words::<W>(&raw)
    }

    fn data_ready(&mut self) -> Result<bool> {
        let [ready] = self.read_words::<1, 3>(CMD_GET_DATA_READY)?;
        Ok(ready == 1)
    }

    fn read_measurement(&mut self) -> Result<Scd30Reading> {
        let words = self.read_words::<6, 18>(CMD_READ_MEASUREMENT)?;
        Ok(Scd30Reading::from_words(&words))
    }

    fn write_temperature_offset(&mut self, offset_c: f32) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE_OFFSET_C).contains(&offset_c) {
            return Err(SensorError::InvalidArgument.into());
        }
        let ticks = (offset_c * 100.0).round() as u16;
        self.send_command_with_argument(CMD_SET_TEMPERATURE_OFFSET, ticks)
    }

    fn write_forced_recalibration(&mut self, ppm: u16) -> Result<()> {
        if !(FRC_MIN_PPM..=FRC_MAX_PPM).contains(&ppm) {
            return Err(SensorError::InvalidArgument.into());
        }
        self.send_command_with_argument(CMD_SET_FORCED_RECALIBRATION, ppm)
    }

    /// Detect, configure and start continuous measurement.
    fn bring_up(&mut self) -> Result<()> {
        self.bus.check_i2c_address(SCD30_I2C_ADDRESS).into_result()?;

        match self.read_words::<1, 3>(CMD_READ_FIRMWARE_VERSION) {
            Ok([version]) => info!("SCD30: firmware {}.{}", version >> 8, version & 0xFF),
            Err(e) => debug!("SCD30: firmware version unavailable ({})", e),
        }

        self.send_command_with_argument(CMD_SET_MEASUREMENT_INTERVAL, self.measurement_interval_s)?;
        if let Some(offset) = self.temperature_offset_c {
            self.write_temperature_offset(offset)?;
        }
        // Argument 0 disables ambient pressure compensation.
        self.send_command_with_argument(CMD_START_CONTINUOUS_MEASUREMENT, 0)
    }

    fn power_cycle(&mut self) {
        if self.power.set_low().is_err() {
            warn!("SCD30: power control pin failed to switch off");
        }
        self.bus.delay_ms(POWER_OFF_MS);
        if self.power.set_high().is_err() {
            warn!("SCD30: power control pin failed to switch on");
        }
        self.bus.delay_ms(BOOT_MS);
    }
}

impl<B, T, P> SensorDriver for Scd30Driver<B, T, P>
where
    B: BusDriver,
    T: TimeSource,
    P: OutputPin,
{
    const SENSOR_TYPE: SensorType = SensorType::Scd30;

    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
        let reading = Scd30Reading::from_bytes(data).ok_or(fmt::Error)?;
        write!(
            out,
            "{{\"CO2 Level\":{:.2}, \"Temperature\":{:.2}, \"Humidity\":{:.2}}}",
            reading.co2_ppm, reading.temperature_c, reading.humidity_pct
        )
    }

    fn initialize(&mut self, _now: Instant) -> bool {
        self.bus.init_sensor_bus();
        if self.power.set_high().is_err() {
            warn!("SCD30: power control pin failed");
            return false;
        }
        self.bus.delay_ms(BOOT_MS);

        self.initialized = match self.bring_up() {
            Ok(()) => true,
            Err(e) => {
                warn!("SCD30: init failed ({})", e);
                false
            }
        };
        self.recovering = false;
        self.initialized
    }

    fn reset(&mut self) {
        warn!("SCD30: power cycling");
        self.power_cycle();
        self.bus.reset_sensor_bus();
        self.initialized = match self.bring_up() {
            Ok(()) => true,
            Err(e) => {
                warn!("SCD30: still failing after power cycle ({})", e);
                // Soft reset as a last resort; next watchdog window retries.
                if let Err(e) = self.send_command(CMD_SOFT_RESET) {
                    debug!("SCD30: soft reset not acknowledged ({})", e);
                }
                false
            }
        };
        self.recovering = !self.initialized;
    }

    fn shutdown(&mut self) {
        if self.initialized {
            let _ = self.send_command(CMD_STOP_CONTINUOUS_MEASUREMENT);
        }
        if self.power.set_low().is_err() {
            warn!("SCD30: power control pin failed to switch off");
        }
        self.bus.shutdown_sensor_bus();
        self.initialized = false;
        self.recovering = false;
    }

    fn update_raw(
        &mut self,
        _now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize) {
        if !self.initialized {
            let status = if self.recovering {
                SensorStatus::Malfunctioning
            } else {
                SensorStatus::Inactive
            };
            return (status, 0);
        }
        self.bus.check_interface_watchdog();

        match self.data_ready() {
            Ok(true) => {}
            Ok(false) => return (SensorStatus::OkNoData, 0),
            Err(e) => {
                debug!("SCD30: data-ready poll failed ({})", e);
                return (SensorStatus::Malfunctioning, 0);
            }
        }

        match self.read_measurement() {
            Ok(reading) if !reading.is_finite() => {
                debug!("SCD30: discarding non-finite measurement {:?}", reading);
                (SensorStatus::Malfunctioning, 0)
            }
            Ok(reading) => {
                out[..SCD30_DATA_LEN].copy_from_slice(&reading.to_bytes());
                (SensorStatus::Ok, SCD30_DATA_LEN)
            }
            Err(e) => {
                debug!("SCD30: measurement read failed ({})", e);
                (SensorStatus::Malfunctioning, 0)
            }
        }
    }

    fn handle_command(&mut self, command: &SensorCommand) -> CommandOutcome {
        if !self.initialized {
            return CommandOutcome::Rejected;
        }
        let result = match *command {
            SensorCommand::SetTemperatureOffset(offset) => {
                let r = self.write_temperature_offset(offset);
                if r.is_ok() {
                    // Survives the next power cycle.
                    self.temperature_offset_c = Some(offset);
                    info!("SCD30: temperature offset set to {:.2} C", offset);
                }
                r
            }
            SensorCommand::SetForcedRecalibration(ppm) => {
                let r = self.write_forced_recalibration(ppm);
                if r.is_ok() {
                    info!("SCD30: forced recalibration to {} ppm", ppm);
                }
                r
            }
        };
        match result {
            Ok(()) => CommandOutcome::Applied,
            Err(e) => {
                warn!("SCD30: command {:?} rejected ({})", command, e);
                CommandOutcome::Rejected
            }
        }
    }
}
