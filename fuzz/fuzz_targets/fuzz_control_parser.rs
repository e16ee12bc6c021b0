//! Fuzz target: inbound control text
//!
//! Feeds arbitrary UTF-8 through the control parser and the command
//! conversion. Neither may panic, and an accepted message must carry a
//! value token that fits the fixed parameter field.
//!
//! cargo fuzz run fuzz_control_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorpod::messaging::codec::{COMMAND_PARAM_LENGTH, MqttMessage, mqtt_to_control_message};
use sensorpod::sensors::SensorCommand;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Some(message) = MqttMessage::new("autobloomer/fuzz/control", text) else {
        return;
    };

    if let Some(control) = mqtt_to_control_message(&message) {
        let value = control.params_str();
        assert!(!value.is_empty());
        assert!(value.len() <= COMMAND_PARAM_LENGTH);

        if let Ok(SensorCommand::SetTemperatureOffset(offset)) = SensorCommand::try_from(&control) {
            assert!(offset.is_finite(), "non-finite offset accepted");
        }
    }
});
