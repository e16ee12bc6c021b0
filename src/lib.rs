//! Sensor pod firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.
//!
//! ```text
//!   bus ──▶ sensors (ManagedSensor per device) ──▶ sensors::group
//!                                                       │ core 1
//!   ════════════════ messaging::mailbox ════════════════╪═══════
//!                                                       │ core 0
//!   adapters (transport) ◀── messaging::codec ◀─────────┘
//! ```

#![deny(unused_must_use)]

pub mod app;
pub mod bus;
pub mod config;
pub mod cores;
pub mod error;
pub mod messaging;
pub mod pins;
pub mod sensors;
pub mod time;

pub mod adapters;
pub mod drivers;

pub use error::{Error, Result};
