//! Unified error types for the sensor pod firmware.
//!
//! A single `Error` enum that every subsystem can convert into. All
//! variants are `Copy` so they can be passed between the bus, sensor and
//! messaging layers without allocation.
//!
//! Note that routine faults do not travel through this type: bus
//! transactions report a [`BusResponse`](crate::bus::BusResponse), sensors
//! report a [`SensorStatus`](crate::sensors::SensorStatus), and malformed
//! control text is simply `None`. `Error` is for the code paths that want
//! `?` propagation inside a driver or at startup.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus transaction did not complete.
    Bus(BusError),
    /// A sensor rejected a request or returned unusable data.
    Sensor(SensorError),
    /// A message could not be built, parsed or queued.
    Message(MessageError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Message(e) => write!(f, "message: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// NACK, arbitration loss or a pin fault.
    Error,
    /// The transaction exceeded its deadline.
    Timeout,
    /// Fewer bytes moved than requested.
    Incomplete,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "transfer error"),
            Self::Timeout => write!(f, "transfer timed out"),
            Self::Incomplete => write!(f, "incomplete transfer"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Sensor has not been (successfully) initialised.
    NotInitialized,
    /// A CRC over received data did not match.
    CrcMismatch,
    /// The device identified itself as something unexpected.
    UnexpectedDevice,
    /// A command argument is outside the accepted range.
    InvalidArgument,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "not initialised"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::UnexpectedDevice => write!(f, "unexpected device id"),
            Self::InvalidArgument => write!(f, "argument out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Messaging errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// Command value could not be converted to a number.
    InvalidValue,
    /// Output did not fit in its fixed-capacity buffer.
    Overflow,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue => write!(f, "invalid command value"),
            Self::Overflow => write!(f, "buffer overflow"),
        }
    }
}

impl From<MessageError> for Error {
    fn from(e: MessageError) -> Self {
        Self::Message(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
