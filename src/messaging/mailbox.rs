//! The pair of queues connecting the hardware core and the network core.
//!
//! ```text
//!          core 1 (hardware)                         core 0 (network)
//!   ┌─────────────────────────┐   readings (2)   ┌──────────────────────────┐
//!   │ Core1Mailbox            │ ───────────────► │ Core0Mailbox             │
//!   │  send_sensor_data_...   │  evict oldest    │  receive_sensor_data     │
//!   │  get_waiting_sensor_... │ ◄─────────────── │  send_sensor_control_... │
//!   └─────────────────────────┘   commands (4)   └──────────────────────────┘
//!                                 reject newest
//! ```
//!
//! Each side gets exactly one endpoint of each queue from
//! [`MulticoreMailbox::split`], which enforces the single-producer /
//! single-consumer contract at compile time.

use log::{debug, warn};

use super::codec::{
    MQTT_MAX_PAYLOAD_LENGTH, MqttMessage, SensorControlMessage, SensorDataMessage, build_topic,
    mqtt_to_control_message,
};
use super::queue::{Consumer, CoreMessageQueue, Producer};
use crate::sensors::group::SensorGroup;
use crate::sensors::registry::SerializerRegistry;

pub const NUM_SENSOR_UPDATE_MESSAGES: usize = 2;
pub const NUM_SENSOR_CONTROL_MESSAGES: usize = 4;

pub struct MulticoreMailbox {
    sensor_data: CoreMessageQueue<SensorDataMessage, NUM_SENSOR_UPDATE_MESSAGES>,
    sensor_control: CoreMessageQueue<SensorControlMessage, NUM_SENSOR_CONTROL_MESSAGES>,
}

impl MulticoreMailbox {
    pub const fn new() -> Self {
        Self {
            sensor_data: CoreMessageQueue::new(),
            sensor_control: CoreMessageQueue::new(),
        }
    }

    /// Hand out the two core-side endpoints. `None` after the first call.
    pub fn split(&self) -> Option<(Core1Mailbox<'_>, Core0Mailbox<'_>)> {
        let (data_tx, data_rx) = self.sensor_data.split()?;
        let (control_tx, control_rx) = self.sensor_control.split()?;
        Some((
            Core1Mailbox {
                data_tx,
                control_rx,
                sequence: 0,
                evicted: 0,
            },
            Core0Mailbox {
                control_tx,
                data_rx,
                latest: None,
            },
        ))
    }
}

impl Default for MulticoreMailbox {
    fn default() -> Self {
        Self::new()
    }
}

// ── Hardware side ─────────────────────────────────────────────

pub struct Core1Mailbox<'m> {
    data_tx: Producer<'m, SensorDataMessage, NUM_SENSOR_UPDATE_MESSAGES>,
    control_rx: Consumer<'m, SensorControlMessage, NUM_SENSOR_CONTROL_MESSAGES>,
    sequence: u32,
    evicted: u32,
}

impl Core1Mailbox<'_> {
    /// Snapshot `group` and queue it for core 0.
    ///
    /// Never blocks. If core 0 has fallen behind, the oldest unread reading
    /// is dropped and `false` is returned.
    pub fn send_sensor_data_to_core0(&mut self, group: &SensorGroup<'_>) -> bool {
        let snapshot = group.snapshot(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        match self.data_tx.push_overwrite(snapshot) {
            None => true,
            Some(stale) => {
                self.evicted = self.evicted.wrapping_add(1);
                debug!("mailbox: reading #{} superseded before core 0 read it", stale.sequence);
                false
            }
        }
    }

    /// Next queued command, if any. Callers drain this until `None`.
    pub fn get_waiting_sensor_control_message(&mut self) -> Option<SensorControlMessage> {
        self.control_rx.pop()
    }

    /// Readings dropped because core 0 had not consumed them yet.
    pub fn evicted_readings(&self) -> u32 {
        self.evicted
    }
}

// ── Network side ──────────────────────────────────────────────

pub struct Core0Mailbox<'m> {
    control_tx: Producer<'m, SensorControlMessage, NUM_SENSOR_CONTROL_MESSAGES>,
    data_rx: Consumer<'m, SensorDataMessage, NUM_SENSOR_UPDATE_MESSAGES>,
    latest: Option<SensorDataMessage>,
}

impl Core0Mailbox<'_> {
    /// Parse an inbound control message and queue it for core 1.
    ///
    /// Malformed text and a full queue are logged and reported as `false`;
    /// neither is surfaced to the sender.
    pub fn send_sensor_control_message_to_core1(&mut self, message: &MqttMessage) -> bool {
        let Some(control) = mqtt_to_control_message(message) else {
            warn!(
                "mailbox: ignoring malformed control message on {}: {:?}",
                message.topic, message.payload
            );
            return false;
        };
        if self.control_tx.try_push(control).is_err() {
            warn!("mailbox: control queue full, dropping {:?}", control.command);
            return false;
        }
        true
    }

    /// Oldest unread reading from core 1. Also remembered as the latest.
    pub fn receive_sensor_data(&mut self) -> Option<SensorDataMessage> {
        let message = self.data_rx.pop()?;
        self.latest = Some(message.clone());
        Some(message)
    }

    /// Most recently received reading.
    pub fn latest(&self) -> Option<&SensorDataMessage> {
        self.latest.as_ref()
    }

    /// Serialize each sensor in the latest reading to its own message.
    ///
    /// Returns `true` if at least one message was produced.
    pub fn latest_sensor_data_to_json<const N: usize>(
        &self,
        registry: &SerializerRegistry,
        location: &str,
        out: &mut heapless::Vec<MqttMessage, N>,
    ) -> bool {
        match &self.latest {
            Some(message) => sensor_data_to_json(registry, location, message, out),
            None => false,
        }
    }
}

/// One message per sensor with data, topic `<prefix>/<location>/<type name>`.
///
/// Sensors without a registered serializer are skipped. Stops when `out`
/// is full.
pub fn sensor_data_to_json<const N: usize>(
    registry: &SerializerRegistry,
    location: &str,
    message: &SensorDataMessage,
    out: &mut heapless::Vec<MqttMessage, N>,
) -> bool {
    let before = out.len();
    for sample in message.samples.iter().filter(|s| !s.data.is_empty()) {
        let Some(payload) =
            registry.data_as_json::<MQTT_MAX_PAYLOAD_LENGTH>(sample.sensor_type, &sample.data)
        else {
            debug!("mailbox: no serializer output for {:?}", sample.sensor_type);
            continue;
        };
        let Some(topic) = build_topic(location, sample.sensor_type.name()) else {
            continue;
        };
        if out.push(MqttMessage { topic, payload }).is_err() {
            break;
        }
    }
    out.len() > before
}
