//! Message types and the text codec between them and the MQTT link.
//!
//! Everything here is pure: no I/O, no shared state, fixed-capacity
//! buffers only. Failures (malformed control text, missing name or
//! location, output that does not fit) are reported as `None` so callers
//! treat them as "nothing to do this cycle".
//!
//! ## Control grammar
//!
//! ```text
//!   <command> <value>        e.g.  "TOFF 2.5"   "SCD30_SET_FRC 450"
//! ```
//!
//! `command` is a packed four-byte identifier (`TOFF`, `SFRC`) or its
//! symbolic alias. `value` is at most [`COMMAND_PARAM_LENGTH`] bytes.
//!
//! ## Reading payload
//!
//! ```text
//!   {"Status":0, "CO2 Level":410.25, "Temperature":21.30, "Humidity":55.10, "Soil Moisture":512}
//! ```
//!
//! Fields after `Status` appear only when that sensor contributed data.

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::sensors::group::MAX_SENSORS_PER_GROUP;
use crate::sensors::scd30::Scd30Reading;
use crate::sensors::soil::moisture_from_bytes;
use crate::sensors::{SensorCommand, SensorData, SensorStatus, SensorType};

pub const MQTT_MAX_TOPIC_LENGTH: usize = 64;
pub const MQTT_MAX_PAYLOAD_LENGTH: usize = 256;
pub const TOPIC_PREFIX: &str = "autobloomer";
pub const COMMAND_PARAM_LENGTH: usize = 8;

pub type Topic = heapless::String<MQTT_MAX_TOPIC_LENGTH>;
pub type Payload = heapless::String<MQTT_MAX_PAYLOAD_LENGTH>;

const STATUS_KEY: &str = "Status";
const CO2_LEVEL_KEY: &str = "CO2 Level";
const TEMPERATURE_KEY: &str = "Temperature";
const HUMIDITY_KEY: &str = "Humidity";
const SOIL_MOISTURE_KEY: &str = "Soil Moisture";

// ── MQTT message ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttMessage {
    pub topic: Topic,
    pub payload: Payload,
}

impl MqttMessage {
    /// `None` if either part exceeds its buffer.
    pub fn new(topic: &str, payload: &str) -> Option<Self> {
        Some(Self {
            topic: Topic::try_from(topic).ok()?,
            payload: Payload::try_from(payload).ok()?,
        })
    }
}

/// `<prefix>/<location>/<name>`
pub fn build_topic(location: &str, name: &str) -> Option<Topic> {
    let mut topic = Topic::new();
    write!(topic, "{}/{}/{}", TOPIC_PREFIX, location, name).ok()?;
    Some(topic)
}

// ── Control messages (core 0 → core 1) ────────────────────────

/// Recognised control commands. Discriminants are the packed tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum SensorControlCommandType {
    SetTemperatureOffset = u32::from_le_bytes(*b"TOFF"),
    SetForcedRecalibration = u32::from_le_bytes(*b"SFRC"),
}

impl SensorControlCommandType {
    pub const ALL: [Self; 2] = [Self::SetTemperatureOffset, Self::SetForcedRecalibration];

    pub fn token(self) -> &'static str {
        match self {
            Self::SetTemperatureOffset => "TOFF",
            Self::SetForcedRecalibration => "SFRC",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            Self::SetTemperatureOffset => "SCD30_SET_TEMP_OFFSET",
            Self::SetForcedRecalibration => "SCD30_SET_FRC",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        if let Ok(packed) = <[u8; 4]>::try_from(token.as_bytes()) {
            let packed = u32::from_le_bytes(packed);
            return Self::ALL.into_iter().find(|c| *c as u32 == packed);
        }
        Self::ALL.into_iter().find(|c| c.alias() == token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorControlMessage {
    pub command: SensorControlCommandType,
    /// Value token, NUL padded.
    pub params: [u8; COMMAND_PARAM_LENGTH],
}

impl SensorControlMessage {
    pub fn new(command: SensorControlCommandType, value: &str) -> Option<Self> {
        let bytes = value.as_bytes();
        if bytes.is_empty() || bytes.len() > COMMAND_PARAM_LENGTH || bytes.contains(&0) {
            return None;
        }
        let mut params = [0u8; COMMAND_PARAM_LENGTH];
        params[..bytes.len()].copy_from_slice(bytes);
        Some(Self { command, params })
    }

    /// The value token, up to the first NUL.
    pub fn params_str(&self) -> &str {
        let end = self
            .params
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_PARAM_LENGTH);
        // Built from a &str and cut at a NUL, so always valid UTF-8.
        core::str::from_utf8(&self.params[..end]).unwrap_or("")
    }
}

/// Parse `"<command> <value>"`. Exactly two tokens are accepted.
pub fn parse_control_text(text: &str) -> Option<SensorControlMessage> {
    let mut tokens = text.split_whitespace();
    let command = tokens.next()?;
    let value = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    SensorControlMessage::new(SensorControlCommandType::from_token(command)?, value)
}

pub fn mqtt_to_control_message(message: &MqttMessage) -> Option<SensorControlMessage> {
    parse_control_text(&message.payload)
}

impl TryFrom<&SensorControlMessage> for SensorCommand {
    type Error = MessageError;

    fn try_from(message: &SensorControlMessage) -> Result<Self, Self::Error> {
        let value = message.params_str().trim();
        match message.command {
            SensorControlCommandType::SetTemperatureOffset => value
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .map(SensorCommand::SetTemperatureOffset)
                .ok_or(MessageError::InvalidValue),
            SensorControlCommandType::SetForcedRecalibration => value
                .parse::<u16>()
                .map(SensorCommand::SetForcedRecalibration)
                .map_err(|_| MessageError::InvalidValue),
        }
    }
}

// ── Sensor data messages (core 1 → core 0) ────────────────────

/// One sensor's contribution to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSample {
    pub sensor_type: SensorType,
    pub status: SensorStatus,
    pub data: SensorData,
}

/// Snapshot of the sensor group taken once per hardware cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorDataMessage {
    pub sequence: u32,
    pub samples: heapless::Vec<SensorSample, MAX_SENSORS_PER_GROUP>,
}

impl SensorDataMessage {
    pub fn sample(&self, sensor_type: SensorType) -> Option<&SensorSample> {
        self.samples.iter().find(|s| s.sensor_type == sensor_type)
    }

    pub fn has_valid_data(&self) -> bool {
        self.samples.iter().any(|s| !s.data.is_empty())
    }
}

/// The combined reading published on the pod's main topic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorDataUpdate {
    pub sensor_status: u8,
    pub scd30: Option<Scd30Reading>,
    pub soil_moisture: Option<u16>,
}

impl SensorDataUpdate {
    /// Status is the worst status in the snapshot.
    pub fn from_message(message: &SensorDataMessage) -> Self {
        let sensor_status = message
            .samples
            .iter()
            .map(|s| s.status.code())
            .max()
            .unwrap_or(SensorStatus::Inactive.code());
        let data_of = |t| message.sample(t).map(|s| s.data.as_slice());
        Self {
            sensor_status,
            scd30: data_of(SensorType::Scd30).and_then(Scd30Reading::from_bytes),
            soil_moisture: data_of(SensorType::SoilMoisture).and_then(moisture_from_bytes),
        }
    }
}

/// Build the topic and JSON body for a combined reading.
///
/// `None` if `name` or `location` is missing or the result does not fit.
pub fn data_update_to_mqtt_message(
    name: Option<&str>,
    location: Option<&str>,
    update: &SensorDataUpdate,
) -> Option<MqttMessage> {
    let topic = build_topic(location?, name?)?;

    let mut payload = Payload::new();
    write!(payload, "{{\"{}\":{}", STATUS_KEY, update.sensor_status).ok()?;
    // Non-finite floats have no JSON form.
    if let Some(r) = update.scd30.filter(Scd30Reading::is_finite) {
        write!(
            payload,
            ", \"{}\":{:.2}, \"{}\":{:.2}, \"{}\":{:.2}",
            CO2_LEVEL_KEY,
            r.co2_ppm,
            TEMPERATURE_KEY,
            r.temperature_c,
            HUMIDITY_KEY,
            r.humidity_pct
        )
        .ok()?;
    }
    if let Some(moisture) = update.soil_moisture {
        write!(payload, ", \"{}\":{}", SOIL_MOISTURE_KEY, moisture).ok()?;
    }
    payload.push('}').ok()?;

    Some(MqttMessage { topic, payload })
}

/// Message on the pod's topic with a literal payload.
pub fn create_test_mqtt_message(
    name: Option<&str>,
    location: Option<&str>,
    message: Option<&str>,
) -> Option<MqttMessage> {
    let topic = build_topic(location?, name?)?;
    let payload = Payload::try_from(message?).ok()?;
    Some(MqttMessage { topic, payload })
}
