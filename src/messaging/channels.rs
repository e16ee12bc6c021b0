//! Transport bridge channels.
//!
//! The MQTT client (or the serial console standing in for it) runs in its
//! own task on core 0. These `embassy-sync` channels carry messages between
//! that task and the network-core loop without heap allocation.
//!
//! ```text
//! ┌──────────────┐  MqttMessage  ┌──────────────────┐
//! │  Transport   │──────────────▶│ NetworkCore loop │
//! │  task        │◀──────────────│ (core 0)         │
//! └──────────────┘  MqttMessage  └──────────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use super::codec::MqttMessage;

/// Inbound depth matches the core-1 command queue.
pub const INBOUND_DEPTH: usize = 4;

/// One combined reading plus a per-sensor message for each sensor kind.
pub const OUTBOUND_DEPTH: usize = 8;

/// Control messages: transport → network core.
pub static INBOUND_CONTROL_CHANNEL: Channel<CriticalSectionRawMutex, MqttMessage, INBOUND_DEPTH> =
    Channel::new();

/// Readings: network core → transport.
pub static OUTBOUND_CHANNEL: Channel<CriticalSectionRawMutex, MqttMessage, OUTBOUND_DEPTH> =
    Channel::new();
