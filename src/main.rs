//! Sensor pod firmware entry point.
//!
//! ```text
//! ┌──────────────────────── core 1 (APP_CPU) ────────────────────────┐
//! │  SCD30 (bit-banged I2C)   soil sensor (I2C0)  sonar (UART1)      │
//! │          └───────────── SensorGroup ─────────────┘               │
//! │                  HardwareCoreExecutor                            │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                  readings ▼ │ ▲ commands      (MulticoreMailbox)
//! ┌───────────────────────────┴──────────────────────────────────────┐
//! │                  NetworkCoreExecutor (main task)                 │
//! │   INBOUND_CONTROL_CHANNEL ▲            ▼ OUTBOUND_CHANNEL        │
//! │   console task ───────────┘            └──────── transport task  │
//! └──────────────────────── core 0 (PRO_CPU) ────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::io::BufRead;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{info, warn};

use esp_idf_hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, PinDriver};
use esp_idf_hal::i2c::{I2C0, I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{self, UartRxDriver};
use esp_idf_hal::units::Hertz;

use sensorpod::adapters::channel_transport::{ChannelSink, ChannelSource};
use sensorpod::adapters::log_sink::LogMessageSink;
use sensorpod::adapters::nvs::NvsConfigStore;
use sensorpod::adapters::time::Esp32TimeAdapter;
use sensorpod::adapters::uart::UartSerialRx;
use sensorpod::app::ports::{ConfigPort, MessageSink, TimeSource};
use sensorpod::bus::I2cInterface;
use sensorpod::bus::bitbang::{BitBangI2c, BitBangTiming};
use sensorpod::bus::hal::HalI2cDriver;
use sensorpod::config::PodConfig;
use sensorpod::cores::{HardwareCoreExecutor, NetworkCoreExecutor};
use sensorpod::drivers::task_pin::{CONSOLE_TASK, HARDWARE_TASK, TRANSPORT_TASK, spawn_on_core};
use sensorpod::messaging::channels::{INBOUND_CONTROL_CHANNEL, OUTBOUND_CHANNEL};
use sensorpod::messaging::codec::{MqttMessage, build_topic};
use sensorpod::messaging::mailbox::MulticoreMailbox;
use sensorpod::pins;
use sensorpod::sensors::group::SensorGroup;
use sensorpod::sensors::registry::SerializerRegistry;
use sensorpod::sensors::scd30::Scd30Driver;
use sensorpod::sensors::soil::SoilDriver;
use sensorpod::sensors::sonar::SonarDriver;
use sensorpod::sensors::{ManagedSensor, Sensor};

static MAILBOX: MulticoreMailbox = MulticoreMailbox::new();

const TRANSPORT_POLL_MS: u32 = 50;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorPod v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let store = match NvsConfigStore::new() {
        Ok(s) => s,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsConfigStore::default()
        }
    };
    let config = match store.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            PodConfig::default()
        }
    };
    info!(
        "Pod '{}' at '{}', per-sensor topics {}",
        config.sensor_name,
        config.location,
        if config.per_sensor_topics { "on" } else { "off" }
    );

    // ── 3. Buses and sensors ──────────────────────────────────
    let peripherals = Peripherals::take()?;
    let time = Esp32TimeAdapter::new();
    let mut registry = SerializerRegistry::new();

    // SAFETY: each GPIO number below is claimed exactly once.
    let (scd30_sda, scd30_scl, scd30_power, sonar_rx, sonar_trigger) = unsafe {
        (
            AnyIOPin::new(pins::SCD30_SDA_GPIO),
            AnyIOPin::new(pins::SCD30_SCL_GPIO),
            AnyOutputPin::new(pins::SCD30_POWER_GPIO),
            AnyInputPin::new(pins::SONAR_RX_GPIO),
            AnyOutputPin::new(pins::SONAR_TRIGGER_GPIO),
        )
    };

    let scd30_bus = I2cInterface::new(
        BitBangI2c::new(
            PinDriver::input_output_od(scd30_sda)?,
            PinDriver::input_output_od(scd30_scl)?,
            time,
            BitBangTiming::default(),
        ),
        time,
        config.bus_config(),
    );
    let scd30 = ManagedSensor::new(
        Scd30Driver::new(scd30_bus, PinDriver::output(scd30_power)?)
            .with_temperature_offset(config.scd30_temperature_offset_c),
        &mut registry,
    );

    // Rebuilt from scratch on every soil bus reset.
    let soil_i2c = || {
        // SAFETY: I2C0 and the soil SDA/SCL pins are used only here, and the
        // previous driver is dropped before the next one is built.
        let (i2c0, sda, scl) = unsafe {
            (
                I2C0::new(),
                AnyIOPin::new(pins::SOIL_SDA_GPIO),
                AnyIOPin::new(pins::SOIL_SCL_GPIO),
            )
        };
        I2cDriver::new(
            i2c0,
            sda,
            scl,
            &I2cConfig::new().baudrate(Hertz(pins::SOIL_I2C_BAUD_HZ)),
        )
    };
    let soil_bus = I2cInterface::new(HalI2cDriver::new(soil_i2c), time, config.bus_config());
    let soil = ManagedSensor::new(
        SoilDriver::new(soil_bus, config.soil_poll_interval()),
        &mut registry,
    );

    let uart = UartRxDriver::new(
        peripherals.uart1,
        sonar_rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart::config::Config::new().baudrate(Hertz(pins::SONAR_BAUD)),
    )?;
    let sonar = ManagedSensor::new(
        SonarDriver::new(UartSerialRx::new(uart), PinDriver::output(sonar_trigger)?, time),
        &mut registry,
    );

    // ── 4. Mailbox ────────────────────────────────────────────
    let (core1_mailbox, core0_mailbox) = MAILBOX
        .split()
        .ok_or_else(|| anyhow!("mailbox already split"))?;

    // ── 5. Core 1: hardware loop ──────────────────────────────
    let sensor_loop = Duration::from_millis(u64::from(config.sensor_loop_interval_ms));
    spawn_on_core(HARDWARE_TASK, move || {
        let (mut scd30, mut soil, mut sonar) = (scd30, soil, sonar);
        let mut group = SensorGroup::new();
        let members: [&mut dyn Sensor; 3] = [&mut scd30, &mut soil, &mut sonar];
        for sensor in members {
            if let Err(e) = group.add(sensor) {
                warn!("core1: {}", e);
            }
        }
        HardwareCoreExecutor::new(group, core1_mailbox, time, sensor_loop).run()
    })?;

    // ── 6. Core 0: console and transport tasks ────────────────
    let control_topic = build_topic(&config.location, "control")
        .ok_or_else(|| anyhow!("location too long for a topic"))?;
    spawn_on_core(CONSOLE_TASK, move || console_reader(&control_topic, &store))?;

    spawn_on_core(TRANSPORT_TASK, move || {
        let mut sink = LogMessageSink::new();
        let mut time = time;
        loop {
            while let Ok(message) = OUTBOUND_CHANNEL.try_receive() {
                sink.publish(&message);
            }
            time.delay_ms(TRANSPORT_POLL_MS);
        }
    })?;

    // ── 7. Core 0: network loop on the main task ──────────────
    info!("System ready.");
    NetworkCoreExecutor::new(
        core0_mailbox,
        ChannelSource::inbound(),
        ChannelSink::outbound(),
        time,
        registry,
        &config,
    )
    .run()
}

/// Read console lines as control text.
///
/// A line starting with `{` is a replacement [`PodConfig`] in JSON; it is
/// validated, persisted and applied on the next boot.
fn console_reader(topic: &str, store: &NvsConfigStore) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            continue;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        if text.starts_with('{') {
            match PodConfig::from_json(text).and_then(|cfg| store.save(&cfg)) {
                Ok(()) => info!("console: config saved, reboot to apply"),
                Err(e) => warn!("console: config rejected ({})", e),
            }
            continue;
        }

        match MqttMessage::new(topic, text) {
            Some(message) => {
                if INBOUND_CONTROL_CHANNEL.try_send(message).is_err() {
                    warn!("console: inbound channel full, dropping '{}'", text);
                }
            }
            None => warn!("console: line too long, dropped"),
        }
    }
}
