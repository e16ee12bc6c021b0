//! Network core (PRO_CPU) loop.
//!
//! Forwards inbound control text to core 1 and turns readings from core 1
//! into outbound MQTT messages. Never touches a sensor or the bus.

use core::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::{MessageSink, MessageSource, TimeSource};
use crate::config::{Name, PodConfig};
use crate::messaging::codec::{
    MqttMessage, SensorDataMessage, SensorDataUpdate, data_update_to_mqtt_message,
};
use crate::messaging::mailbox::{Core0Mailbox, sensor_data_to_json};
use crate::sensors::group::MAX_SENSORS_PER_GROUP;
use crate::sensors::registry::SerializerRegistry;

pub struct NetworkCoreExecutor<'m, S, K, T> {
    mailbox: Core0Mailbox<'m>,
    source: S,
    sink: K,
    time: T,
    registry: SerializerRegistry,
    location: Name,
    sensor_name: Name,
    per_sensor_topics: bool,
    loop_interval: Duration,
    published: u32,
    dropped: u32,
}

impl<'m, S, K, T> NetworkCoreExecutor<'m, S, K, T>
where
    S: MessageSource,
    K: MessageSink,
    T: TimeSource,
{
    pub fn new(
        mailbox: Core0Mailbox<'m>,
        source: S,
        sink: K,
        time: T,
        registry: SerializerRegistry,
        config: &PodConfig,
    ) -> Self {
        Self {
            mailbox,
            source,
            sink,
            time,
            registry,
            location: config.location.clone(),
            sensor_name: config.sensor_name.clone(),
            per_sensor_topics: config.per_sensor_topics,
            loop_interval: Duration::from_millis(u64::from(config.network_loop_interval_ms)),
            published: 0,
            dropped: 0,
        }
    }

    /// Forward every pending inbound message. Returns how many were queued.
    pub fn poll_control_messages(&mut self) -> usize {
        let mut forwarded = 0;
        while let Some(message) = self.source.poll() {
            if self.mailbox.send_sensor_control_message_to_core1(&message) {
                forwarded += 1;
            }
        }
        forwarded
    }

    /// Publish every reading waiting in the mailbox. Returns messages sent.
    pub fn publish_sensor_data(&mut self) -> usize {
        let mut sent = 0;
        while let Some(reading) = self.mailbox.receive_sensor_data() {
            sent += self.publish_reading(&reading);
        }
        sent
    }

    pub fn run_cycle(&mut self) -> usize {
        self.poll_control_messages();
        self.publish_sensor_data()
    }

    pub fn run(&mut self) -> ! {
        info!(
            "core0: publishing as {}/{} every {} ms",
            self.location,
            self.sensor_name,
            self.loop_interval.as_millis()
        );
        let interval_ms = u32::try_from(self.loop_interval.as_millis()).unwrap_or(u32::MAX);
        loop {
            self.run_cycle();
            self.time.delay_ms(interval_ms);
        }
    }

    pub fn published(&self) -> u32 {
        self.published
    }

    /// Messages the sink refused or that could not be built.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    fn publish_reading(&mut self, reading: &SensorDataMessage) -> usize {
        let mut sent = 0;
        let update = SensorDataUpdate::from_message(reading);
        match data_update_to_mqtt_message(
            Some(self.sensor_name.as_str()),
            Some(self.location.as_str()),
            &update,
        ) {
            Some(message) => sent += usize::from(self.publish(&message)),
            None => {
                warn!("core0: reading #{} does not fit a message", reading.sequence);
                self.dropped = self.dropped.wrapping_add(1);
            }
        }

        if self.per_sensor_topics {
            let mut messages: heapless::Vec<MqttMessage, MAX_SENSORS_PER_GROUP> =
                heapless::Vec::new();
            sensor_data_to_json(&self.registry, &self.location, reading, &mut messages);
            for message in &messages {
                sent += usize::from(self.publish(message));
            }
        }
        sent
    }

    fn publish(&mut self, message: &MqttMessage) -> bool {
        if self.sink.publish(message) {
            self.published = self.published.wrapping_add(1);
            debug!("core0: {} <- {}", message.topic, message.payload);
            true
        } else {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("core0: transport dropped message for {}", message.topic);
            false
        }
    }
}
