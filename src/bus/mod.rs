//! Bus reliability layer.
//!
//! [`I2cInterface`] wraps a raw [`BusDriver`] (hardware peripheral or the
//! bit-banged implementation in [`bitbang`]) with:
//!
//! - a deadline on every transaction, derived from [`BusConfig`],
//! - a four-way response taxonomy ([`BusResponse`]) that separates bus
//!   faults (`Error`, `Timeout`) from short transfers (`Incomplete`),
//! - an inactivity watchdog. Every completed transfer rearms it; if it
//!   lapses the bus is torn down and reinitialised. This recovers from a
//!   peer holding SCL or SDA low indefinitely.
//!
//! ```text
//!   Sensor driver ──▶ I2cInterface ──▶ BusDriver (HAL / bit-bang)
//!                        │
//!                        └── watchdog: now > deadline ⇒ reset_sensor_bus()
//! ```

pub mod bitbang;
pub mod hal;

use core::time::Duration;

use log::{debug, warn};

use crate::app::ports::TimeSource;
use crate::error::BusError;
use crate::time::{Instant, deadline_passed};

/// Default per-transaction timeout. Covers the SCD30's worst-case clock stretch.
pub const DEFAULT_I2C_TIMEOUT: Duration = Duration::from_millis(250);
/// Default bus inactivity watchdog.
pub const I2C_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefixed writes up to this many bytes go out as one transaction.
const PREFIXED_STAGING_LEN: usize = 66;

// ── Response taxonomy ─────────────────────────────────────────

/// Outcome of a single bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusResponse {
    Ok,
    /// NACK or electrical fault.
    Error,
    /// Transaction did not finish before its deadline.
    Timeout,
    /// Fewer bytes transferred than requested.
    Incomplete,
}

impl BusResponse {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// `Error` and `Timeout` indicate the bus itself is unhealthy.
    pub fn is_bus_fault(self) -> bool {
        matches!(self, Self::Error | Self::Timeout)
    }

    pub fn into_result(self) -> Result<(), BusError> {
        match self {
            Self::Ok => Ok(()),
            Self::Error => Err(BusError::Error),
            Self::Timeout => Err(BusError::Timeout),
            Self::Incomplete => Err(BusError::Incomplete),
        }
    }
}

/// Low-level failure reported by a [`BusDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Address byte was not acknowledged.
    Nack,
    /// Arbitration loss, pin fault or other electrical error.
    Bus,
    /// Clock stretching or the driver's own timer exceeded the deadline.
    Timeout,
}

impl From<TransferError> for BusResponse {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Nack | TransferError::Bus => Self::Error,
            TransferError::Timeout => Self::Timeout,
        }
    }
}

// ── Driver seam ───────────────────────────────────────────────

/// Raw I2C master. Implementations move bytes; they keep no recovery state.
pub trait BusDriver {
    /// Configure the lines. Called at startup and after every bus reset.
    fn init(&mut self) -> Result<(), TransferError>;

    /// Release the lines.
    fn deinit(&mut self);

    /// Write `bytes` to `address`. Returns the number of bytes acknowledged.
    fn write(
        &mut self,
        address: u8,
        bytes: &[u8],
        send_stop: bool,
        deadline: Instant,
    ) -> Result<usize, TransferError>;

    /// Read into `buf` from `address`. Returns the number of bytes received.
    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
        send_stop: bool,
        deadline: Instant,
    ) -> Result<usize, TransferError>;
}

/// Timing parameters for one [`I2cInterface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub transaction_timeout: Duration,
    pub watchdog_timeout: Duration,
    /// Issue STOP after each transaction (otherwise repeated START).
    pub send_stop: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_I2C_TIMEOUT,
            watchdog_timeout: I2C_WATCHDOG_TIMEOUT,
            send_stop: true,
        }
    }
}

// ── Reliability wrapper ───────────────────────────────────────

pub struct I2cInterface<D, T> {
    driver: D,
    time: T,
    config: BusConfig,
    watchdog_deadline: Option<Instant>,
    bus_faults: u32,
    bus_resets: u32,
}

impl<D: BusDriver, T: TimeSource> I2cInterface<D, T> {
    pub fn new(driver: D, time: T, config: BusConfig) -> Self {
        Self {
            driver,
            time,
            config,
            watchdog_deadline: None,
            bus_faults: 0,
            bus_resets: 0,
        }
    }

    /// Configure the bus lines and arm the inactivity watchdog.
    pub fn init_sensor_bus(&mut self) {
        if let Err(e) = self.driver.init() {
            // The watchdog still arms so a later check retries the init.
            warn!("I2C: bus init failed ({:?})", e);
        }
        self.reset_interface_watchdog();
    }

    pub fn shutdown_sensor_bus(&mut self) {
        self.driver.deinit();
        self.watchdog_deadline = None;
    }

    pub fn reset_sensor_bus(&mut self) {
        self.bus_resets = self.bus_resets.wrapping_add(1);
        self.shutdown_sensor_bus();
        self.init_sensor_bus();
    }

    pub fn reset_interface_watchdog(&mut self) {
        self.watchdog_deadline = Some(self.time.now() + self.config.watchdog_timeout);
    }

    /// Reset the bus if the watchdog has lapsed. Returns `true` if it did.
    pub fn check_interface_watchdog(&mut self) -> bool {
        if deadline_passed(self.watchdog_deadline, self.time.now()) {
            warn!("**** I2C interface timed out, resetting ****");
            self.reset_sensor_bus();
            return true;
        }
        false
    }

    /// Check for a device with a zero-length write.
    pub fn check_i2c_address(&mut self, address: u8) -> BusResponse {
        let deadline = self.deadline();
        let result = self
            .driver
            .write(address, &[], self.config.send_stop, deadline);
        self.complete(result, 0, deadline)
    }

    pub fn write_i2c_data(&mut self, address: u8, bytes: &[u8]) -> BusResponse {
        if bytes.is_empty() {
            return BusResponse::Ok;
        }
        let deadline = self.deadline();
        let result = self
            .driver
            .write(address, bytes, self.config.send_stop, deadline);
        self.complete(result, bytes.len(), deadline)
    }

    /// Write `prefix` (usually a register address) followed by `bytes`.
    pub fn write_prefixed_i2c_data(
        &mut self,
        address: u8,
        prefix: &[u8],
        bytes: &[u8],
    ) -> BusResponse {
        let mut staged: heapless::Vec<u8, PREFIXED_STAGING_LEN> = heapless::Vec::new();
        if staged.extend_from_slice(prefix).is_ok() && staged.extend_from_slice(bytes).is_ok() {
            return self.write_i2c_data(address, &staged);
        }

        // Too long to stage: prefix and payload as two transactions.
        let response = self.write_i2c_data(address, prefix);
        if !response.is_ok() {
            return response;
        }
        self.write_i2c_data(address, bytes)
    }

    pub fn write_to_i2c_register(
        &mut self,
        address: u8,
        reg_high: u8,
        reg_low: u8,
        bytes: &[u8],
    ) -> BusResponse {
        self.write_prefixed_i2c_data(address, &[reg_high, reg_low], bytes)
    }

    pub fn read_from_i2c(&mut self, address: u8, buf: &mut [u8]) -> BusResponse {
        let deadline = self.deadline();
        let expected = buf.len();
        let result = self
            .driver
            .read(address, buf, self.config.send_stop, deadline);
        self.complete(result, expected, deadline)
    }

    /// Select a register, wait `read_delay_ms`, then read the response.
    pub fn read_from_i2c_register(
        &mut self,
        address: u8,
        reg_high: u8,
        reg_low: u8,
        buf: &mut [u8],
        read_delay_ms: u16,
    ) -> BusResponse {
        let response = self.write_to_i2c_register(address, reg_high, reg_low, &[]);
        if !response.is_ok() {
            return response;
        }
        if read_delay_ms > 0 {
            self.time.delay_ms(u32::from(read_delay_ms));
        }
        self.read_from_i2c(address, buf)
    }

    pub fn now(&self) -> Instant {
        self.time.now()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.time.delay_ms(ms);
    }

    /// Bus-level faults (`Error` or `Timeout`) since construction.
    pub fn bus_faults(&self) -> u32 {
        self.bus_faults
    }

    /// Watchdog-triggered and explicit resets since construction.
    pub fn bus_resets(&self) -> u32 {
        self.bus_resets
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog_deadline
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    // ── internal ──────────────────────────────────────────────

    fn deadline(&self) -> Instant {
        self.time.now() + self.config.transaction_timeout
    }

    fn complete(
        &mut self,
        result: Result<usize, TransferError>,
        expected: usize,
        deadline: Instant,
    ) -> BusResponse {
        let response = match result {
            // A driver that cannot abort mid-transfer still reports late
            // completion as a timeout.
            Ok(_) if self.time.now().is_past(deadline) => BusResponse::Timeout,
            Ok(n) if n >= expected => BusResponse::Ok,
            Ok(_) => BusResponse::Incomplete,
            Err(e) => BusResponse::from(e),
        };

        if response.is_bus_fault() {
            self.bus_faults = self.bus_faults.wrapping_add(1);
            debug!("I2C: transaction failed ({:?})", response);
        } else {
            self.reset_interface_watchdog();
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeTime(Rc<Cell<u64>>);

    impl FakeTime {
        fn advance_ms(&self, ms: u64) {
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

    #[derive(Default)]
    struct ScriptLog {
        inits: u32,
        deinits: u32,
        writes: Vec<(u8, Vec<u8>)>,
    }

    /// Driver returning queued results, then full-length success.
    struct ScriptedDriver {
        log: Rc<RefCell<ScriptLog>>,
        results: Vec<Result<usize, TransferError>>,
        read_fill: u8,
        stall: Option<FakeTime>,
    }

    impl ScriptedDriver {
        fn new(log: Rc<RefCell<ScriptLog>>) -> Self {
            Self {
                log,
                results: Vec::new(),
                read_fill: 0xA5,
                stall: None,
            }
        }

        fn next(&mut self, len: usize) -> Result<usize, TransferError> {
            if let Some(t) = &self.stall {
                t.advance_ms(300);
            }
            if self.results.is_empty() {
                Ok(len)
            } else {
                self.results.remove(0)
            }
        }
    }

    impl BusDriver for ScriptedDriver {
        fn init(&mut self) -> Result<(), TransferError> {
            self.log.borrow_mut().inits += 1;
            Ok(())
        }

        fn deinit(&mut self) {
            self.log.borrow_mut().deinits += 1;
        }

        fn write(
            &mut self,
            address: u8,
            bytes: &[u8],
            _send_stop: bool,
            _deadline: Instant,
        ) -> Result<usize, TransferError> {
            self.log.borrow_mut().writes.push((address, bytes.to_vec()));
            self.next(bytes.len())
        }

        fn read(
            &mut self,
            _address: u8,
            buf: &mut [u8],
            _send_stop: bool,
            _deadline: Instant,
        ) -> Result<usize, TransferError> {
            buf.fill(self.read_fill);
            self.next(buf.len())
        }
    }

    fn setup() -> (
        I2cInterface<ScriptedDriver, FakeTime>,
        Rc<RefCell<ScriptLog>>,
        FakeTime,
    ) {
        let log = Rc::new(RefCell::new(ScriptLog::default()));
        let time = FakeTime::default();
        let mut bus = I2cInterface::new(
            ScriptedDriver::new(log.clone()),
            time.clone(),
            BusConfig::default(),
        );
        bus.init_sensor_bus();
        (bus, log, time)
    }

    #[test]
    fn init_arms_watchdog() {
        let (bus, log, _) = setup();
        assert_eq!(log.borrow().inits, 1);
        assert_eq!(
            bus.watchdog_deadline(),
            Some(Instant::ZERO + I2C_WATCHDOG_TIMEOUT)
        );
    }

    #[test]
    fn error_and_timeout_map_to_bus_faults() {
        let (mut bus, _, _) = setup();
        bus.driver_mut().results = vec![Err(TransferError::Nack), Err(TransferError::Timeout)];
        assert_eq!(bus.write_i2c_data(0x61, &[1, 2]), BusResponse::Error);
        assert_eq!(bus.write_i2c_data(0x61, &[1, 2]), BusResponse::Timeout);
        assert_eq!(bus.bus_faults(), 2);
    }

    #[test]
    fn short_read_is_incomplete_not_fault() {
        let (mut bus, _, _) = setup();
        bus.driver_mut().results = vec![Ok(2)];
        let mut buf = [0u8; 4];
        let r = bus.read_from_i2c(0x36, &mut buf);
        assert_eq!(r, BusResponse::Incomplete);
        assert!(!r.is_bus_fault());
        assert_eq!(bus.bus_faults(), 0);
    }

    #[test]
    fn empty_write_is_ok_without_touching_bus() {
        let (mut bus, log, _) = setup();
        assert_eq!(bus.write_i2c_data(0x10, &[]), BusResponse::Ok);
        assert!(log.borrow().writes.is_empty());
    }

    #[test]
    fn address_check_is_zero_length_write() {
        let (mut bus, log, _) = setup();
        assert_eq!(bus.check_i2c_address(0x61), BusResponse::Ok);
        assert_eq!(log.borrow().writes, vec![(0x61, vec![])]);
    }

    #[test]
    fn register_write_is_single_transaction() {
        let (mut bus, log, _) = setup();
        assert_eq!(
            bus.write_to_i2c_register(0x36, 0x00, 0x7F, &[0xFF]),
            BusResponse::Ok
        );
        assert_eq!(log.borrow().writes, vec![(0x36, vec![0x00, 0x7F, 0xFF])]);
    }

    #[test]
    fn register_read_stops_on_failed_select() {
        let (mut bus, _, time) = setup();
        bus.driver_mut().results = vec![Err(TransferError::Nack)];
        let mut buf = [0u8; 2];
        let r = bus.read_from_i2c_register(0x36, 0x0F, 0x10, &mut buf, 5);
        assert_eq!(r, BusResponse::Error);
        assert_eq!(buf, [0, 0]);
        // No delay was taken.
        assert_eq!(time.now(), Instant::ZERO);
    }

    #[test]
    fn register_read_waits_then_reads() {
        let (mut bus, _, time) = setup();
        let mut buf = [0u8; 2];
        let r = bus.read_from_i2c_register(0x36, 0x0F, 0x10, &mut buf, 5);
        assert_eq!(r, BusResponse::Ok);
        assert_eq!(buf, [0xA5, 0xA5]);
        assert_eq!(time.now(), Instant::from_millis(5));
    }

    #[test]
    fn late_completion_reports_timeout() {
        let (mut bus, _, time) = setup();
        bus.driver_mut().stall = Some(time.clone());
        assert_eq!(bus.write_i2c_data(0x61, &[0xD3, 0x04]), BusResponse::Timeout);
    }

    #[test]
    fn watchdog_resets_only_after_lapse() {
        let (mut bus, log, time) = setup();
        time.advance_ms(10_000);
        assert!(!bus.check_interface_watchdog());
        time.advance_ms(1);
        assert!(bus.check_interface_watchdog());
        assert_eq!(log.borrow().deinits, 1);
        assert_eq!(log.borrow().inits, 2);
        assert_eq!(bus.bus_resets(), 1);
        // Rearmed by the reset.
        assert!(!bus.check_interface_watchdog());
    }

    #[test]
    fn successful_traffic_rearms_watchdog_faults_do_not() {
        let (mut bus, _, time) = setup();
        time.advance_ms(9_000);
        assert!(bus.write_i2c_data(0x61, &[1]).is_ok());
        time.advance_ms(9_000);
        assert!(!bus.check_interface_watchdog());

        bus.driver_mut().results = vec![Err(TransferError::Bus); 3];
        for _ in 0..3 {
            let _ = bus.write_i2c_data(0x61, &[1]);
        }
        time.advance_ms(1_001);
        assert!(bus.check_interface_watchdog());
    }

    #[test]
    fn into_result_maps_variants() {
        assert_eq!(BusResponse::Ok.into_result(), Ok(()));
        assert_eq!(
            BusResponse::Incomplete.into_result(),
            Err(BusError::Incomplete)
        );
    }
}
