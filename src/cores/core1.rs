//! Hardware core (APP_CPU) loop.
//!
//! ```text
//!   ┌───────────────────────────────────────────────┐
//!   │ 1. drain control commands (no suspension)     │
//!   │ 2. update every sensor                        │
//!   │ 3. valid data?  yes → table + send to core 0  │
//!   │                 no  → "NO DATA" table         │
//!   │ 4. sleep loop interval                        │
//!   └───────────────────────────────────────────────┘
//! ```
//!
//! Commands queued before step 1 of cycle N are applied in cycle N;
//! commands arriving during the drain may land in N or N+1.

use core::time::Duration;

use log::{info, warn};

use crate::app::ports::TimeSource;
use crate::messaging::mailbox::Core1Mailbox;
use crate::sensors::group::SensorGroup;
use crate::sensors::scd30::Scd30Reading;
use crate::sensors::soil::moisture_from_bytes;
use crate::sensors::sonar::distance_from_bytes;
use crate::sensors::{CommandOutcome, SensorCommand, SensorType};

pub struct HardwareCoreExecutor<'g, 'm, T> {
    group: SensorGroup<'g>,
    mailbox: Core1Mailbox<'m>,
    time: T,
    loop_interval: Duration,
    cycles: u32,
}

impl<'g, 'm, T: TimeSource> HardwareCoreExecutor<'g, 'm, T> {
    pub fn new(
        group: SensorGroup<'g>,
        mailbox: Core1Mailbox<'m>,
        time: T,
        loop_interval: Duration,
    ) -> Self {
        Self {
            group,
            mailbox,
            time,
            loop_interval,
            cycles: 0,
        }
    }

    /// Bring up every sensor. Returns how many are active.
    pub fn initialize(&mut self) -> usize {
        let now = self.time.now();
        self.group.initialize(now)
    }

    /// Apply every command currently queued by core 0.
    ///
    /// Returns the number of commands taken off the queue.
    pub fn process_sensor_control_commands(&mut self) -> usize {
        let mut drained = 0;
        while let Some(message) = self.mailbox.get_waiting_sensor_control_message() {
            drained += 1;
            let command = match SensorCommand::try_from(&message) {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        "core1: cannot convert {:?} value {:?} ({})",
                        message.command,
                        message.params_str(),
                        e
                    );
                    continue;
                }
            };
            match self.group.dispatch(&command) {
                CommandOutcome::Applied => info!("core1: applied {:?}", command),
                CommandOutcome::Rejected => warn!("core1: sensor rejected {:?}", command),
                CommandOutcome::NotSupported => {
                    warn!("core1: no sensor handles {:?}", command);
                }
            }
        }
        drained
    }

    /// One pass of the hardware loop without the trailing sleep.
    ///
    /// Returns `true` if a reading was handed to core 0.
    pub fn run_cycle(&mut self) -> bool {
        self.process_sensor_control_commands();

        let now = self.time.now();
        self.group.update(now);
        self.cycles = self.cycles.wrapping_add(1);

        if self.group.has_valid_data() {
            self.log_readings();
            self.mailbox.send_sensor_data_to_core0(&self.group);
            true
        } else {
            self.log_no_data();
            false
        }
    }

    pub fn run(&mut self) -> ! {
        let initialised = self.initialize();
        info!(
            "core1: {} of {} sensors active, loop every {} ms",
            initialised,
            self.group.len(),
            self.loop_interval.as_millis()
        );
        let interval_ms = u32::try_from(self.loop_interval.as_millis()).unwrap_or(u32::MAX);
        loop {
            self.run_cycle();
            self.time.delay_ms(interval_ms);
        }
    }

    pub fn group(&self) -> &SensorGroup<'g> {
        &self.group
    }

    pub fn mailbox(&self) -> &Core1Mailbox<'m> {
        &self.mailbox
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    fn log_readings(&self) {
        info!("+----------------------------------+");
        for sensor in self.group.iter() {
            let data = &sensor.cached_data().data;
            match sensor.sensor_type() {
                SensorType::Scd30 => {
                    if let Some(r) = Scd30Reading::from_bytes(data) {
                        info!("| CO2         | {:7.2} PPM        |", r.co2_ppm);
                        info!("| Temperature | {:5.2} \u{00b0}C           |", r.temperature_c);
                        info!("| Humidity    | {:5.2} %            |", r.humidity_pct);
                    }
                }
                SensorType::SoilMoisture => {
                    if let Some(m) = moisture_from_bytes(data) {
                        info!("| Soil        | {:5}              |", m);
                    }
                }
                SensorType::Sonar => {
                    if let Some(d) = distance_from_bytes(data) {
                        info!("| Distance    | {:5} mm           |", d);
                    }
                }
            }
        }
        info!("+----------------------------------+");
    }

    fn log_no_data(&self) {
        let flag = |present: bool| if present { '*' } else { ' ' };
        info!("+---------- NO DATA ---------------+");
        info!(
            "| Soil sensor active: {} [{}]         |",
            u8::from(self.group.is_soil_sensor_active()),
            flag(self.group.has_soil_sensor())
        );
        info!(
            "| SCD30 active:       {} [{}]         |",
            u8::from(self.group.is_scd30_active()),
            flag(self.group.has_scd30_sensor())
        );
        if self.group.has_sonar_sensor() {
            info!(
                "| Sonar active:       {} [*]         |",
                u8::from(self.group.is_sonar_active())
            );
        }
        info!("+----------------------------------+");
    }
}
