//! The pod's fixed set of sensors, driven together once per cycle.
//!
//! The group only borrows its members. The hardware executor owns the
//! concrete sensors and hands the group `&mut dyn Sensor` references, so
//! the group never decides a sensor's lifetime.

use log::info;

use super::{CommandOutcome, Sensor, SensorCommand, SensorType};
use crate::error::{Error, Result};
use crate::messaging::codec::{SensorDataMessage, SensorSample};
use crate::time::Instant;

pub const MAX_SENSORS_PER_GROUP: usize = 4;

pub struct SensorGroup<'a> {
    sensors: heapless::Vec<&'a mut dyn Sensor, MAX_SENSORS_PER_GROUP>,
}

impl<'a> SensorGroup<'a> {
    pub fn new() -> Self {
        Self {
            sensors: heapless::Vec::new(),
        }
    }

    /// Append a member. Order is kept for updates and snapshots.
    pub fn add(&mut self, sensor: &'a mut dyn Sensor) -> Result<()> {
        self.sensors
            .push(sensor)
            .map_err(|_| Error::Config("sensor group full"))
    }

    /// Initialise every member. Returns how many came up.
    pub fn initialize(&mut self, now: Instant) -> usize {
        let mut up = 0;
        for sensor in self.sensors.iter_mut() {
            if sensor.initialize(now) {
                up += 1;
            }
        }
        info!("sensor group: {}/{} sensors initialised", up, self.sensors.len());
        up
    }

    pub fn update(&mut self, now: Instant) {
        for sensor in self.sensors.iter_mut() {
            sensor.update(now);
        }
    }

    pub fn shutdown(&mut self) {
        for sensor in self.sensors.iter_mut() {
            sensor.shutdown();
        }
    }

    /// Any member holds unexpired cached data.
    pub fn has_valid_data(&self) -> bool {
        self.sensors.iter().any(|s| s.has_data())
    }

    pub fn has_sensor(&self, sensor_type: SensorType) -> bool {
        self.sensors.iter().any(|s| s.sensor_type() == sensor_type)
    }

    pub fn is_active(&self, sensor_type: SensorType) -> bool {
        self.sensors
            .iter()
            .any(|s| s.sensor_type() == sensor_type && s.is_active())
    }

    pub fn is_scd30_active(&self) -> bool {
        self.is_active(SensorType::Scd30)
    }

    pub fn has_scd30_sensor(&self) -> bool {
        self.has_sensor(SensorType::Scd30)
    }

    pub fn is_soil_sensor_active(&self) -> bool {
        self.is_active(SensorType::SoilMoisture)
    }

    pub fn has_soil_sensor(&self) -> bool {
        self.has_sensor(SensorType::SoilMoisture)
    }

    pub fn is_sonar_active(&self) -> bool {
        self.is_active(SensorType::Sonar)
    }

    pub fn has_sonar_sensor(&self) -> bool {
        self.has_sensor(SensorType::Sonar)
    }

    /// Route a command to the members of its target kind.
    ///
    /// The first member that does not answer `NotSupported` decides the
    /// outcome.
    pub fn dispatch(&mut self, command: &SensorCommand) -> CommandOutcome {
        let target = command.target();
        for sensor in self.sensors.iter_mut() {
            if sensor.sensor_type() != target {
                continue;
            }
            match sensor.handle_command(command) {
                CommandOutcome::NotSupported => continue,
                outcome => return outcome,
            }
        }
        CommandOutcome::NotSupported
    }

    /// Copy every member's status and cached bytes into a message.
    pub fn snapshot(&self, sequence: u32) -> SensorDataMessage {
        let mut message = SensorDataMessage {
            sequence,
            ..SensorDataMessage::default()
        };
        for sensor in self.sensors.iter() {
            let cache = sensor.cached_data();
            // Capacities match, so the push cannot fail.
            let _ = message.samples.push(SensorSample {
                sensor_type: sensor.sensor_type(),
                status: cache.status,
                data: cache.data.clone(),
            });
        }
        message
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Sensor> + '_ {
        self.sensors.iter().map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorGroup<'_> {
    fn default() -> Self {
        Self::new()
    }
}
