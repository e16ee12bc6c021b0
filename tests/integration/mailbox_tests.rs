//! Cross-core mailbox under real threads: the hardware loop runs on its own
//! thread while the test thread plays the network core.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};

use sensorpod::cores::HardwareCoreExecutor;
use sensorpod::messaging::codec::MqttMessage;
use sensorpod::messaging::mailbox::{Core0Mailbox, MulticoreMailbox};
use sensorpod::sensors::group::SensorGroup;
use sensorpod::sensors::registry::SerializerRegistry;
use sensorpod::sensors::scd30::Scd30Reading;
use sensorpod::sensors::{ManagedSensor, SensorCommand, SensorType};

use crate::mock_hw::{FakeScd30, FakeTime, scd30_bytes};

const CYCLES: u32 = 2_000;

#[test]
fn readings_and_commands_cross_cores_in_order() {
    let mailbox = MulticoreMailbox::new();
    let (core1, mut core0) = mailbox.split().unwrap();
    let done = AtomicBool::new(false);

    let applied = std::thread::scope(|s| {
        let hardware = s.spawn(|| {
            let time = FakeTime::default();
            let mut registry = SerializerRegistry::new();
            let (driver, script) = FakeScd30::new();
            let mut scd30 = ManagedSensor::new(driver, &mut registry);
            let mut group = SensorGroup::new();
            group.add(&mut scd30).unwrap();

            let mut hw =
                HardwareCoreExecutor::new(group, core1, time.clone(), Duration::from_millis(1));
            hw.initialize();
            // CO2 mirrors the snapshot sequence so the receiver can check integrity.
            let mut cycle = 0u32;
            while cycle < CYCLES || script.borrow().commands.len() < 3 {
                script.borrow_mut().payload = scd30_bytes(cycle as f32, 20.0, 50.0);
                time.advance_ms(1);
                hw.run_cycle();
                cycle += 1;
                if cycle % 64 == 0 {
                    std::thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
            let applied = script.borrow().commands.clone();
            applied
        });

        for ppm in 400..403 {
            assert!(send_frc(&mut core0, ppm));
        }

        let mut last: Option<u32> = None;
        let mut received = 0u32;
        loop {
            let finished = done.load(Ordering::Acquire);
            while let Some(reading) = core0.receive_sensor_data() {
                if let Some(prev) = last {
                    assert!(reading.sequence > prev, "{} after {}", reading.sequence, prev);
                }
                let sample = reading.sample(SensorType::Scd30).unwrap();
                let scd = Scd30Reading::from_bytes(&sample.data).unwrap();
                assert_eq!(scd.co2_ppm, reading.sequence as f32);
                last = Some(reading.sequence);
                received += 1;
            }
            if finished {
                break;
            }
            std::thread::yield_now();
        }
        assert!(received > 0);
        assert_eq!(core0.latest().map(|m| m.sequence), last);

        hardware.join().unwrap()
    });

    assert_eq!(
        applied,
        [
            SensorCommand::SetForcedRecalibration(400),
            SensorCommand::SetForcedRecalibration(401),
            SensorCommand::SetForcedRecalibration(402)
        ]
    );
}

fn send_frc(core0: &mut Core0Mailbox<'_>, ppm: u16) -> bool {
    let text = format!("SFRC {ppm}");
    core0.send_sensor_control_message_to_core1(
        &MqttMessage::new("autobloomer/pod1/control", &text).unwrap(),
    )
}

#[test]
fn full_command_queue_rejects_newest() {
    let mailbox = MulticoreMailbox::new();
    let (mut core1, mut core0) = mailbox.split().unwrap();
    for v in 400..404 {
        assert!(send_frc(&mut core0, v));
    }
    assert!(!send_frc(&mut core0, 404));

    let drained: Vec<String> = std::iter::from_fn(|| core1.get_waiting_sensor_control_message())
        .map(|m| m.params_str().to_owned())
        .collect();
    assert_eq!(drained, ["400", "401", "402", "403"]);
    assert!(send_frc(&mut core0, 405));
}

#[test]
fn mailbox_splits_once() {
    let mailbox = MulticoreMailbox::new();
    let endpoints = mailbox.split();
    assert!(endpoints.is_some());
    assert!(mailbox.split().is_none());
}
