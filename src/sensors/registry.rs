//! Sensor type → JSON serializer lookup.
//!
//! Populated as each [`ManagedSensor`](super::ManagedSensor) is constructed
//! and then handed by reference to the network core, so the generic cache
//! logic never needs to know a reading's layout.

use core::fmt;

use heapless::FnvIndexMap;

use super::SensorType;

/// Writes one reading's raw bytes as a JSON object.
pub type JsonSerializer = fn(&[u8], &mut dyn fmt::Write) -> fmt::Result;

/// Distinct sensor kinds the registry can hold (power of two).
pub const MAX_SENSOR_TYPES: usize = 8;

#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: FnvIndexMap<SensorType, JsonSerializer, MAX_SENSOR_TYPES>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self {
            serializers: FnvIndexMap::new(),
        }
    }

    /// Register or replace the serializer for `sensor_type`.
    /// `false` if the registry is full.
    pub fn register(&mut self, sensor_type: SensorType, serializer: JsonSerializer) -> bool {
        self.serializers.insert(sensor_type, serializer).is_ok()
    }

    pub fn contains(&self, sensor_type: SensorType) -> bool {
        self.serializers.contains_key(&sensor_type)
    }

    /// Serialize `data` with the serializer registered for `sensor_type`.
    ///
    /// `None` if no serializer is registered or the output does not fit.
    pub fn data_as_json<const N: usize>(
        &self,
        sensor_type: SensorType,
        data: &[u8],
    ) -> Option<heapless::String<N>> {
        let serializer = self.serializers.get(&sensor_type)?;
        let mut out = heapless::String::new();
        serializer(data, &mut out).ok()?;
        Some(out)
    }
}
