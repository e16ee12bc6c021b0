//! Fuzz target: reading snapshot → combined JSON message
//!
//! Builds a snapshot from arbitrary sample bytes and statuses and renders
//! it. Rendering may refuse (payload too long) but must never panic, and
//! any rendered payload must be a single JSON object.
//!
//! cargo fuzz run fuzz_data_update

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorpod::messaging::codec::{
    SensorDataMessage, SensorDataUpdate, SensorSample, data_update_to_mqtt_message,
};
use sensorpod::sensors::{SensorData, SensorStatus, SensorType};

const KINDS: [SensorType; 3] = [SensorType::Scd30, SensorType::SoilMoisture, SensorType::Sonar];
const STATUSES: [SensorStatus; 4] = [
    SensorStatus::Ok,
    SensorStatus::OkNoData,
    SensorStatus::Inactive,
    SensorStatus::Malfunctioning,
];

fuzz_target!(|data: &[u8]| {
    let mut message = SensorDataMessage::default();
    let mut rest = data;
    // Each sample: kind byte, status byte, length byte, bytes.
    while let [kind, status, len, tail @ ..] = rest {
        let len = usize::from(*len).min(tail.len());
        let Ok(bytes) = SensorData::from_slice(&tail[..len]) else {
            break;
        };
        let sample = SensorSample {
            sensor_type: KINDS[usize::from(*kind) % KINDS.len()],
            status: STATUSES[usize::from(*status) % STATUSES.len()],
            data: bytes,
        };
        if message.samples.push(sample).is_err() {
            break;
        }
        rest = &tail[len..];
    }

    let update = SensorDataUpdate::from_message(&message);
    if let Some(mqtt) = data_update_to_mqtt_message(Some("fuzz"), Some("pod"), &update) {
        let payload = mqtt.payload.as_str();
        assert!(payload.starts_with("{\"Status\":"));
        assert!(payload.ends_with('}'));
        assert_eq!(mqtt.topic.as_str(), "autobloomer/pod/fuzz");
    }
});
