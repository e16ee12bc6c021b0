//! Software I2C master over two open-drain GPIOs.
//!
//! Used for the SCD30, which stretches SCL for long periods and misbehaves
//! on the ESP32's hardware controller. Lines are driven open-drain:
//! `set_low()` pulls the line down, `set_high()` releases it to the pull-up.
//!
//! All waits go through the injected [`TimeSource`], so the protocol can be
//! exercised against a simulated bus without real delays. Clock stretching
//! is bounded both by [`BitBangTiming::stretch_timeout_us`] and by the
//! transaction deadline handed down from [`I2cInterface`](super::I2cInterface).

use embedded_hal::digital::{InputPin, OutputPin};

use super::{BusDriver, TransferError};
use crate::app::ports::TimeSource;
use crate::time::Instant;

/// Clock pulses issued to free a slave stuck mid-byte.
const BUS_CLEAR_PULSES: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitBangTiming {
    /// Full SCL period.
    pub clock_period_us: u32,
    /// Longest tolerated clock stretch.
    pub stretch_timeout_us: u32,
}

impl Default for BitBangTiming {
    fn default() -> Self {
        Self {
            clock_period_us: 10,
            stretch_timeout_us: 150_000,
        }
    }
}

pub struct BitBangI2c<SDA, SCL, T> {
    sda: SDA,
    scl: SCL,
    time: T,
    timing: BitBangTiming,
}

impl<SDA, SCL, T> BitBangI2c<SDA, SCL, T>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
    T: TimeSource,
{
    pub fn new(sda: SDA, scl: SCL, time: T, timing: BitBangTiming) -> Self {
        Self {
            sda,
            scl,
            time,
            timing,
        }
    }

    // ── line primitives ───────────────────────────────────────

    fn sda_low(&mut self) -> Result<(), TransferError> {
        self.sda.set_low().map_err(|_| TransferError::Bus)
    }

    fn sda_release(&mut self) -> Result<(), TransferError> {
        self.sda.set_high().map_err(|_| TransferError::Bus)
    }

    fn sda_is_high(&mut self) -> Result<bool, TransferError> {
        self.sda.is_high().map_err(|_| TransferError::Bus)
    }

    fn scl_low(&mut self) -> Result<(), TransferError> {
        self.scl.set_low().map_err(|_| TransferError::Bus)
    }

    fn scl_release(&mut self) -> Result<(), TransferError> {
        self.scl.set_high().map_err(|_| TransferError::Bus)
    }

    fn half_period(&mut self) {
        self.time.delay_us(self.timing.clock_period_us / 2);
    }

    /// Block until SCL reads high, polling once per clock period.
    fn wait_while_clock_stretching(&mut self, deadline: Instant) -> Result<(), TransferError> {
        let start = self.time.now();
        let limit = start
            + core::time::Duration::from_micros(u64::from(self.timing.stretch_timeout_us));
        loop {
            if self.scl.is_high().map_err(|_| TransferError::Bus)? {
                return Ok(());
            }
            let now = self.time.now();
            if now.is_past(limit) || now.is_past(deadline) {
                return Err(TransferError::Timeout);
            }
            self.time.delay_us(self.timing.clock_period_us.max(1));
        }
    }

    // ── framing ───────────────────────────────────────────────

    fn start(&mut self, deadline: Instant) -> Result<(), TransferError> {
        self.sda_release()?;
        self.half_period();
        self.scl_release()?;
        self.wait_while_clock_stretching(deadline)?;
        self.sda_low()?;
        self.half_period();
        self.scl_low()?;
        self.half_period();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransferError> {
        self.sda_low()?;
        self.half_period();
        self.scl_release()?;
        self.half_period();
        self.sda_release()?;
        self.half_period();
        Ok(())
    }

    /// Clock one byte out. Returns `true` if the slave acknowledged it.
    fn write_byte(&mut self, byte: u8, deadline: Instant) -> Result<bool, TransferError> {
        for bit in (0..8).rev() {
            self.scl_low()?;
            if (byte >> bit) & 1 == 1 {
                self.sda_release()?;
            } else {
                self.sda_low()?;
            }
            self.half_period();
            self.scl_release()?;
            self.half_period();
            self.wait_while_clock_stretching(deadline)?;
        }
        self.scl_low()?;
        self.sda_release()?;
        self.half_period();
        self.scl_release()?;
        self.wait_while_clock_stretching(deadline)?;
        let acked = !self.sda_is_high()?;
        self.scl_low()?;
        Ok(acked)
    }

    /// Clock one byte in, then ACK (`true`) or NACK it.
    fn read_byte(&mut self, ack: bool, deadline: Instant) -> Result<u8, TransferError> {
        let mut byte = 0u8;
        self.sda_release()?;
        for bit in (0..8).rev() {
            self.half_period();
            self.scl_release()?;
            self.wait_while_clock_stretching(deadline)?;
            if self.sda_is_high()? {
                byte |= 1 << bit;
            }
            self.scl_low()?;
        }
        if ack {
            self.sda_low()?;
        } else {
            self.sda_release()?;
        }
        self.half_period();
        self.scl_release()?;
        self.half_period();
        self.wait_while_clock_stretching(deadline)?;
        self.scl_low()?;
        self.sda_release()?;
        Ok(byte)
    }

    /// Send START and the address byte, issuing STOP if it is not acknowledged.
    fn address(&mut self, address_byte: u8, deadline: Instant) -> Result<(), TransferError> {
        self.start(deadline)?;
        match self.write_byte(address_byte, deadline) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.stop()?;
                Err(TransferError::Nack)
            }
            Err(e) => {
                let _ = self.stop();
                Err(e)
            }
        }
    }

    /// Release both lines, then clock SCL until a stuck slave frees SDA.
    fn clear_bus(&mut self) -> Result<(), TransferError> {
        self.sda_release()?;
        self.scl_release()?;
        self.half_period();
        if self.sda_is_high()? {
            return Ok(());
        }

        log::warn!("bit-bang I2C: SDA held low, clocking bus clear");
        for _ in 0..BUS_CLEAR_PULSES {
            self.scl_low()?;
            self.half_period();
            self.scl_release()?;
            self.half_period();
            if self.sda_is_high()? {
                break;
            }
        }
        if !self.sda_is_high()? {
            return Err(TransferError::Bus);
        }
        // Leave the slave in a known state.
        self.scl_low()?;
        self.half_period();
        self.stop()
    }
}

impl<SDA, SCL, T> BusDriver for BitBangI2c<SDA, SCL, T>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
    T: TimeSource,
{
    fn init(&mut self) -> Result<(), TransferError> {
        self.clear_bus()
    }

    fn deinit(&mut self) {
        let _ = self.sda_release();
        let _ = self.scl_release();
    }

    fn write(
        &mut self,
        address: u8,
        bytes: &[u8],
        send_stop: bool,
        deadline: Instant,
    ) -> Result<usize, TransferError> {
        self.address(address << 1, deadline)?;

        let mut written = 0;
        for &byte in bytes {
            match self.write_byte(byte, deadline) {
                Ok(true) => written += 1,
                Ok(false) => {
                    self.stop()?;
                    return Ok(written);
                }
                Err(e) => {
                    let _ = self.stop();
                    return Err(e);
                }
            }
        }
        if send_stop {
            self.stop()?;
        }
        Ok(written)
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
        send_stop: bool,
        deadline: Instant,
    ) -> Result<usize, TransferError> {
        self.address((address << 1) | 1, deadline)?;

        let count = buf.len();
        for (i, slot) in buf.iter_mut().enumerate() {
            // Last byte is NACKed.
            match self.read_byte(i + 1 < count, deadline) {
                Ok(byte) => *slot = byte,
                Err(e) => {
                    let _ = self.stop();
                    return Err(e);
                }
            }
        }
        if send_stop {
            self.stop()?;
        }
        Ok(count)
    }
}
