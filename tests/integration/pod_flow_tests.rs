//! End-to-end flow on one thread: scripted drivers → managed sensors →
//! sensor group → hardware executor → mailbox → network executor → sink.

use core::time::Duration;

use sensorpod::app::ports::TimeSource;
use sensorpod::config::{Name, PodConfig};
use sensorpod::cores::{HardwareCoreExecutor, NetworkCoreExecutor};
use sensorpod::messaging::mailbox::MulticoreMailbox;
use sensorpod::sensors::group::SensorGroup;
use sensorpod::sensors::registry::SerializerRegistry;
use sensorpod::sensors::{ManagedSensor, SensorCommand, SensorStatus, SensorType};
use sensorpod::time::Instant;

use crate::mock_hw::{FakeScd30, FakeSoil, FakeTime, RecordingSink, VecSource, scd30_bytes};

const LOOP: Duration = Duration::from_millis(500);

fn config(per_sensor_topics: bool) -> PodConfig {
    PodConfig {
        location: Name::try_from("pod1").unwrap(),
        sensor_name: Name::try_from("pod").unwrap(),
        per_sensor_topics,
        ..PodConfig::default()
    }
}

#[test]
fn reading_travels_from_driver_to_sink() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    let (soil_driver, soil) = FakeSoil::new();
    scd.borrow_mut().payload = scd30_bytes(410.25, 21.30, 55.10);
    soil.borrow_mut().payload = 512u16.to_le_bytes().to_vec();
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);
    let mut soil_sensor = ManagedSensor::new(soil_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();
    group.add(&mut soil_sensor).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(false),
    );

    assert_eq!(hw.initialize(), 2);
    assert!(hw.run_cycle());
    assert_eq!(net.run_cycle(), 1);

    assert_eq!(sink.topics(), ["autobloomer/pod1/pod"]);
    assert_eq!(
        sink.payloads(),
        ["{\"Status\":0, \"CO2 Level\":410.25, \"Temperature\":21.30, \"Humidity\":55.10, \"Soil Moisture\":512}"]
    );
    assert_eq!(net.published(), 1);
    assert_eq!(net.dropped(), 0);

    let body: serde_json::Value = serde_json::from_str(&sink.payloads()[0]).unwrap();
    assert_eq!(body["Status"], 0);
    assert_eq!(body["Soil Moisture"], 512);
}

#[test]
fn per_sensor_topics_follow_the_combined_message() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    let (soil_driver, soil) = FakeSoil::new();
    scd.borrow_mut().payload = scd30_bytes(600.0, 20.0, 40.0);
    soil.borrow_mut().payload = 300u16.to_le_bytes().to_vec();
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);
    let mut soil_sensor = ManagedSensor::new(soil_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();
    group.add(&mut soil_sensor).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(true),
    );

    hw.initialize();
    hw.run_cycle();
    assert_eq!(net.run_cycle(), 3);
    assert_eq!(
        sink.topics(),
        [
            "autobloomer/pod1/pod",
            "autobloomer/pod1/scd30",
            "autobloomer/pod1/soil"
        ]
    );
    assert_eq!(sink.payloads()[1], "{\"CO2 Level\":600.00}");
    assert_eq!(sink.payloads()[2], "{\"Soil Moisture\":300}");
}

#[test]
fn control_text_reaches_the_scd30_driver() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    let (soil_driver, soil) = FakeSoil::new();
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);
    let mut soil_sensor = ManagedSensor::new(soil_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut soil_sensor).unwrap();
    group.add(&mut scd30).unwrap();

    let source = VecSource::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        source.clone(),
        RecordingSink::default(),
        time.clone(),
        registry,
        &config(false),
    );

    source.push("autobloomer/pod1/control", "TOFF 2.5");
    source.push("autobloomer/pod1/control", "SCD30_SET_FRC 450");
    source.push("autobloomer/pod1/control", "REBOOT now");
    source.push("autobloomer/pod1/control", "SFRC 99999");
    assert_eq!(net.poll_control_messages(), 3);

    hw.initialize();
    hw.run_cycle();

    assert_eq!(
        scd.borrow().commands,
        [
            SensorCommand::SetTemperatureOffset(2.5),
            SensorCommand::SetForcedRecalibration(450)
        ]
    );
    assert!(soil.borrow().commands.is_empty());
}

#[test]
fn unresponsive_sensor_is_reset_after_watchdog_window() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    scd.borrow_mut().status = SensorStatus::Malfunctioning;
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(false),
    );

    assert_eq!(hw.initialize(), 1);
    for _ in 0..15 {
        time.advance_ms(1_000);
        assert!(!hw.run_cycle());
    }
    assert_eq!(scd.borrow().resets, 0, "deadline itself is not a lapse");

    time.advance_ms(500);
    hw.run_cycle();
    assert_eq!(scd.borrow().resets, 1);

    // Rearmed: the next reset needs another full window.
    for _ in 0..15 {
        time.advance_ms(1_000);
        hw.run_cycle();
    }
    assert_eq!(scd.borrow().resets, 1);
    time.advance_ms(1_000);
    hw.run_cycle();
    assert_eq!(scd.borrow().resets, 2);

    assert_eq!(net.run_cycle(), 0);
    assert!(sink.payloads().is_empty());
    assert!(!hw.group().is_scd30_active());
}

#[test]
fn cached_reading_expires_five_seconds_after_last_fresh_data() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    scd.borrow_mut().payload = scd30_bytes(800.0, 25.0, 50.0);
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(false),
    );

    hw.initialize();
    time.set(Instant::from_secs(10));
    assert!(hw.run_cycle());

    scd.borrow_mut().status = SensorStatus::OkNoData;
    time.set(Instant::from_secs(15));
    assert!(hw.run_cycle(), "still within the cache window");
    assert_eq!(net.publish_sensor_data(), 2);

    time.set(Instant::from_micros(15_000_001));
    assert!(!hw.run_cycle());
    assert!(hw.group().is_scd30_active());
    assert_eq!(net.publish_sensor_data(), 0);

    // Both published copies carry the cached reading.
    for payload in sink.payloads() {
        assert!(payload.contains("\"CO2 Level\":800.00"), "{payload}");
        assert!(payload.starts_with("{\"Status\":"));
    }
    // The no-data cycle reported status 1 while the cache was still warm.
    assert!(sink.payloads()[1].starts_with("{\"Status\":1"));
}

#[test]
fn slow_network_core_sees_only_the_newest_readings() {
    let time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(false),
    );

    hw.initialize();
    for co2 in [100.0, 200.0, 300.0] {
        scd.borrow_mut().payload = scd30_bytes(co2, 20.0, 50.0);
        time.advance_ms(500);
        hw.run_cycle();
    }
    assert_eq!(hw.mailbox().evicted_readings(), 1);

    assert_eq!(net.publish_sensor_data(), 2);
    let payloads = sink.payloads();
    assert!(payloads[0].contains("\"CO2 Level\":200.00"));
    assert!(payloads[1].contains("\"CO2 Level\":300.00"));
}

#[test]
fn inactive_sensor_still_shows_in_the_group_status() {
    let mut time = FakeTime::default();
    let mut registry = SerializerRegistry::new();
    let (scd_driver, scd) = FakeScd30::new();
    let (soil_driver, soil) = FakeSoil::new();
    scd.borrow_mut().payload = scd30_bytes(500.0, 19.5, 45.0);
    {
        let mut s = soil.borrow_mut();
        s.init_ok = false;
        s.status = SensorStatus::Inactive;
    }
    let mut scd30 = ManagedSensor::new(scd_driver, &mut registry);
    let mut soil_sensor = ManagedSensor::new(soil_driver, &mut registry);

    let mailbox = MulticoreMailbox::new();
    let (core1, core0) = mailbox.split().unwrap();
    let mut group = SensorGroup::new();
    group.add(&mut scd30).unwrap();
    group.add(&mut soil_sensor).unwrap();

    let sink = RecordingSink::default();
    let mut hw = HardwareCoreExecutor::new(group, core1, time.clone(), LOOP);
    let mut net = NetworkCoreExecutor::new(
        core0,
        VecSource::default(),
        sink.clone(),
        time.clone(),
        registry,
        &config(false),
    );

    assert_eq!(hw.initialize(), 1);
    time.delay_ms(500);
    assert!(hw.run_cycle());
    assert!(hw.group().has_soil_sensor());
    assert!(!hw.group().is_soil_sensor_active());
    assert!(hw.group().has_sensor(SensorType::Scd30));

    net.run_cycle();
    assert_eq!(
        sink.payloads(),
        ["{\"Status\":2, \"CO2 Level\":500.00, \"Temperature\":19.50, \"Humidity\":45.00}"]
    );
}
