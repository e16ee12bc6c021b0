//! Log-based message sink adapter.
//!
//! Implements [`MessageSink`] by writing each outbound message to the
//! ESP-IDF logger (UART / USB-CDC in production). Stands in for the MQTT
//! client until one is attached; a broker adapter implements the same trait.

use log::info;

use crate::app::ports::MessageSink;
use crate::messaging::codec::MqttMessage;

/// Adapter that logs every published message to the serial console.
#[derive(Default)]
pub struct LogMessageSink {
    published: u32,
}

impl LogMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u32 {
        self.published
    }
}

impl MessageSink for LogMessageSink {
    fn publish(&mut self, message: &MqttMessage) -> bool {
        self.published = self.published.wrapping_add(1);
        info!("MQTT | {} | {}", message.topic, message.payload);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_counts_messages() {
        let mut sink = LogMessageSink::new();
        let msg = MqttMessage::new("autobloomer/lab/pod", "{\"Status\":0}").unwrap();
        assert!(sink.publish(&msg));
        assert!(sink.publish(&msg));
        assert_eq!(sink.published(), 2);
    }
}
