//! UART-output ultrasonic distance sensor.
//!
//! The sensor streams 4-byte frames while its trigger line is held high:
//!
//! ```text
//!   0xFF | dist_hi | dist_lo | sum   where sum = (0xFF + hi + lo) mod 256
//! ```
//!
//! Any `0xFF` byte restarts framing. At most one frame is consumed per
//! update so a backlog drains over several cycles instead of stalling the
//! hardware loop.

use core::fmt;

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use super::{SENSOR_DATA_BUFFER_SIZE, SensorDriver, SensorStatus, SensorType};
use crate::app::ports::{SerialRx, TimeSource};
use crate::time::Instant;

pub const SONAR_PACKET_SIZE: usize = 4;
const FRAME_HEADER: u8 = 0xFF;
const RESET_PULSE_MS: u32 = 1;

/// Decode a cached sonar reading (distance in mm, `u16` little-endian).
pub fn distance_from_bytes(data: &[u8]) -> Option<u16> {
    match data {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

fn checksum(frame: &[u8; SONAR_PACKET_SIZE]) -> u8 {
    frame[0].wrapping_add(frame[1]).wrapping_add(frame[2])
}

pub struct SonarDriver<R, P, T> {
    rx: R,
    trigger: P,
    time: T,
    frame: [u8; SONAR_PACKET_SIZE],
    pos: usize,
    initialized: bool,
}

impl<R, P, T> SonarDriver<R, P, T>
where
    R: SerialRx,
    P: OutputPin,
    T: TimeSource,
{
    pub fn new(rx: R, trigger: P, time: T) -> Self {
        Self {
            rx,
            trigger,
            time,
            frame: [0; SONAR_PACKET_SIZE],
            pos: 0,
            initialized: false,
        }
    }

    /// Feed one byte into the framer. Returns a full frame when one completes.
    fn push_byte(&mut self, byte: u8) -> Option<[u8; SONAR_PACKET_SIZE]> {
        if byte == FRAME_HEADER {
            self.pos = 0;
        } else if self.pos == 0 {
            // Waiting for a header.
            return None;
        }
        self.frame[self.pos] = byte;
        self.pos += 1;
        if self.pos == SONAR_PACKET_SIZE {
            self.pos = 0;
            return Some(self.frame);
        }
        None
    }
}

impl<R, P, T> SensorDriver for SonarDriver<R, P, T>
where
    R: SerialRx,
    P: OutputPin,
    T: TimeSource,
{
    const SENSOR_TYPE: SensorType = SensorType::Sonar;

    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
        let distance = distance_from_bytes(data).ok_or(fmt::Error)?;
        write!(out, "{{\"Distance\":{}}}", distance)
    }

    fn initialize(&mut self, _now: Instant) -> bool {
        // Trigger high selects continuous serial output.
        if self.trigger.set_high().is_err() {
            warn!("sonar: trigger pin failed");
            return false;
        }
        self.pos = 0;
        self.initialized = true;
        info!("sonar: streaming");
        true
    }

    fn reset(&mut self) {
        if self.trigger.set_low().is_err() {
            warn!("sonar: trigger pin failed to go low");
        }
        self.pos = 0;
        self.time.delay_ms(RESET_PULSE_MS);
        if self.trigger.set_high().is_err() {
            warn!("sonar: trigger pin failed to go high");
        }
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }

    fn update_raw(
        &mut self,
        _now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize) {
        if !self.initialized {
            return (SensorStatus::Inactive, 0);
        }

        while let Some(byte) = self.rx.read_byte() {
            let Some(frame) = self.push_byte(byte) else {
                continue;
            };
            if checksum(&frame) != frame[3] {
                return (SensorStatus::Malfunctioning, 0);
            }
            let distance = u16::from_be_bytes([frame[1], frame[2]]);
            out[..2].copy_from_slice(&distance.to_le_bytes());
            return (SensorStatus::Ok, 2);
        }
        (SensorStatus::OkNoData, 0)
    }
}
