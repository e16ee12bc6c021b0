//! Mock hardware and transport for integration tests.
//!
//! Scripted drivers replay whatever status and bytes a test puts in their
//! shared [`Script`], and record every reset and command so tests can
//! assert on the full history without touching real buses.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use sensorpod::app::ports::{MessageSink, MessageSource, TimeSource};
use sensorpod::messaging::codec::MqttMessage;
use sensorpod::sensors::scd30::Scd30Reading;
use sensorpod::sensors::soil::moisture_from_bytes;
use sensorpod::sensors::{
    CommandOutcome, SENSOR_DATA_BUFFER_SIZE, SensorCommand, SensorDriver, SensorStatus, SensorType,
};
use sensorpod::time::Instant;

// ── Time ──────────────────────────────────────────────────────

/// Manually advanced clock shared between a test and the code under test.
#[derive(Clone, Default)]
pub struct FakeTime(Rc<Cell<u64>>);

#[allow(dead_code)]
impl FakeTime {
    pub fn set(&self, t: Instant) {
        self.0.set(t.as_micros());
    }

    pub fn advance_ms(&self, ms: u64) {
        self.0.set(self.0.get() + ms * 1_000);
    }
}

impl TimeSource for FakeTime {
    fn now(&self) -> Instant {
        Instant::from_micros(self.0.get())
    }

    fn delay_us(&mut self, us: u32) {
        self.0.set(self.0.get() + u64::from(us));
    }
}

// ── Scripted drivers ──────────────────────────────────────────

pub struct Script {
    pub status: SensorStatus,
    pub payload: Vec<u8>,
    pub init_ok: bool,
    pub resets: u32,
    pub commands: Vec<SensorCommand>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status: SensorStatus::Ok,
            payload: Vec::new(),
            init_ok: true,
            resets: 0,
            commands: Vec::new(),
        }
    }
}

pub type SharedScript = Rc<RefCell<Script>>;

fn replay(script: &SharedScript, out: &mut [u8; SENSOR_DATA_BUFFER_SIZE]) -> (SensorStatus, usize) {
    let s = script.borrow();
    out[..s.payload.len()].copy_from_slice(&s.payload);
    (s.status, s.payload.len())
}

/// Stands in for the SCD30: same type tag, same data layout.
pub struct FakeScd30(pub SharedScript);

#[allow(dead_code)]
impl FakeScd30 {
    pub fn new() -> (Self, SharedScript) {
        let script = SharedScript::default();
        (Self(script.clone()), script)
    }
}

#[allow(dead_code)]
pub fn scd30_bytes(co2_ppm: f32, temperature_c: f32, humidity_pct: f32) -> Vec<u8> {
    Scd30Reading {
        co2_ppm,
        temperature_c,
        humidity_pct,
    }
    .to_bytes()
    .to_vec()
}

impl SensorDriver for FakeScd30 {
    const SENSOR_TYPE: SensorType = SensorType::Scd30;

    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
        let r = Scd30Reading::from_bytes(data).ok_or(fmt::Error)?;
        write!(out, "{{\"CO2 Level\":{:.2}}}", r.co2_ppm)
    }

    fn initialize(&mut self, _now: Instant) -> bool {
        self.0.borrow().init_ok
    }

    fn reset(&mut self) {
        self.0.borrow_mut().resets += 1;
    }

    fn shutdown(&mut self) {}

    fn update_raw(
        &mut self,
        _now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize) {
        replay(&self.0, out)
    }

    fn handle_command(&mut self, command: &SensorCommand) -> CommandOutcome {
        self.0.borrow_mut().commands.push(*command);
        CommandOutcome::Applied
    }
}

/// Stands in for the soil sensor.
pub struct FakeSoil(pub SharedScript);

#[allow(dead_code)]
impl FakeSoil {
    pub fn new() -> (Self, SharedScript) {
        let script = SharedScript::default();
        (Self(script.clone()), script)
    }
}

impl SensorDriver for FakeSoil {
    const SENSOR_TYPE: SensorType = SensorType::SoilMoisture;

    fn serialize_json(data: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
        let m = moisture_from_bytes(data).ok_or(fmt::Error)?;
        write!(out, "{{\"Soil Moisture\":{}}}", m)
    }

    fn initialize(&mut self, _now: Instant) -> bool {
        self.0.borrow().init_ok
    }

    fn reset(&mut self) {
        self.0.borrow_mut().resets += 1;
    }

    fn shutdown(&mut self) {}

    fn update_raw(
        &mut self,
        _now: Instant,
        out: &mut [u8; SENSOR_DATA_BUFFER_SIZE],
    ) -> (SensorStatus, usize) {
        replay(&self.0, out)
    }
}

// ── Transport ─────────────────────────────────────────────────

/// Records every published message.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Rc<RefCell<Vec<MqttMessage>>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn payloads(&self) -> Vec<String> {
        self.0.borrow().iter().map(|m| m.payload.to_string()).collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.0.borrow().iter().map(|m| m.topic.to_string()).collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl MessageSink for RecordingSink {
    fn publish(&mut self, message: &MqttMessage) -> bool {
        self.0.borrow_mut().push(message.clone());
        true
    }
}

/// Replays queued inbound messages.
#[derive(Clone, Default)]
pub struct VecSource(pub Rc<RefCell<VecDeque<MqttMessage>>>);

#[allow(dead_code)]
impl VecSource {
    pub fn push(&self, topic: &str, payload: &str) {
        let message = MqttMessage::new(topic, payload).expect("message fits");
        self.0.borrow_mut().push_back(message);
    }
}

impl MessageSource for VecSource {
    fn poll(&mut self) -> Option<MqttMessage> {
        self.0.borrow_mut().pop_front()
    }
}
