//! [`BusDriver`] over a hardware I2C peripheral.
//!
//! Any `embedded_hal::i2c::I2c` implementation works; on the ESP32-S3 this
//! is `esp_idf_hal::i2c::I2cDriver`. The peripheral enforces its own
//! timeout, so `deadline` is only checked by the wrapping
//! [`I2cInterface`](super::I2cInterface) after the call returns.
//!
//! The driver is built by a factory rather than passed in. `deinit` drops
//! it (on ESP-IDF that deletes the driver and releases the pins) and
//! `init` calls the factory again, so a bus reset starts from a freshly
//! configured peripheral.

use core::fmt;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};
use log::{debug, warn};

use super::{BusDriver, TransferError};
use crate::time::Instant;

pub struct HalI2cDriver<I, F> {
    i2c: Option<I>,
    build: F,
    builds: u32,
}

impl<I, E, F> HalI2cDriver<I, F>
where
    I: I2c,
    E: fmt::Debug,
    F: FnMut() -> Result<I, E>,
{
    /// Nothing is built until the first `init`.
    pub fn new(build: F) -> Self {
        Self {
            i2c: None,
            build,
            builds: 0,
        }
    }

    /// The live peripheral, if the last `init` succeeded.
    pub fn peripheral(&self) -> Option<&I> {
        self.i2c.as_ref()
    }

    /// Number of times the factory produced a peripheral.
    pub fn builds(&self) -> u32 {
        self.builds
    }

    fn live(&mut self) -> Result<&mut I, TransferError> {
        self.i2c.as_mut().ok_or(TransferError::Bus)
    }
}

fn map_error(kind: ErrorKind) -> TransferError {
    match kind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address | NoAcknowledgeSource::Unknown) => {
            TransferError::Nack
        }
        _ => TransferError::Bus,
    }
}

impl<I, E, F> BusDriver for HalI2cDriver<I, F>
where
    I: I2c,
    E: fmt::Debug,
    F: FnMut() -> Result<I, E>,
{
    fn init(&mut self) -> Result<(), TransferError> {
        if self.i2c.is_some() {
            return Ok(());
        }
        match (self.build)() {
            Ok(i2c) => {
                self.i2c = Some(i2c);
                self.builds = self.builds.wrapping_add(1);
                debug!("I2C: peripheral configured (build {})", self.builds);
                Ok(())
            }
            Err(e) => {
                warn!("I2C: peripheral configuration failed ({:?})", e);
                Err(TransferError::Bus)
            }
        }
    }

    fn deinit(&mut self) {
        self.i2c = None;
    }

    fn write(
        &mut self,
        address: u8,
        bytes: &[u8],
        _send_stop: bool,
        _deadline: Instant,
    ) -> Result<usize, TransferError> {
        match self.live()?.write(address, bytes) {
            Ok(()) => Ok(bytes.len()),
            // A data-phase NACK still moved the bytes before it.
            Err(e) if e.kind() == ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => Ok(0),
            Err(e) => Err(map_error(e.kind())),
        }
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
        _send_stop: bool,
        _deadline: Instant,
    ) -> Result<usize, TransferError> {
        self.live()?
            .read(address, buf)
            .map(|()| buf.len())
            .map_err(|e| map_error(e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    use embedded_hal::i2c::{ErrorType, Operation};

    use crate::app::ports::TimeSource;
    use crate::bus::{BusConfig, BusResponse, I2C_WATCHDOG_TIMEOUT, I2cInterface};

    #[derive(Debug)]
    struct FakeError(ErrorKind);

    impl embedded_hal::i2c::Error for FakeError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    struct FakeI2c {
        fail_with: Option<ErrorKind>,
        written: Vec<u8>,
        dropped: Rc<Cell<u32>>,
    }

    impl Drop for FakeI2c {
        fn drop(&mut self) {
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    impl ErrorType for FakeI2c {
        type Error = FakeError;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if let Some(kind) = self.fail_with {
                return Err(FakeError(kind));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.written.extend_from_slice(bytes),
                    Operation::Read(buf) => buf.fill(0x42),
                }
            }
            Ok(())
        }
    }

    fn fake(fail_with: Option<ErrorKind>) -> FakeI2c {
        FakeI2c {
            fail_with,
            written: Vec::new(),
            dropped: Rc::default(),
        }
    }

    fn driver(
        fail_with: Option<ErrorKind>,
    ) -> HalI2cDriver<FakeI2c, impl FnMut() -> Result<FakeI2c, Infallible>> {
        let mut d = HalI2cDriver::new(move || Ok(fake(fail_with)));
        assert_eq!(d.init(), Ok(()));
        d
    }

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

    #[test]
    fn write_reports_full_length() {
        let mut d = driver(None);
        assert_eq!(d.write(0x36, &[1, 2, 3], true, Instant::ZERO), Ok(3));
        assert_eq!(d.peripheral().unwrap().written, vec![1, 2, 3]);
    }

    #[test]
    fn address_nack_maps_to_nack() {
        let mut d = driver(Some(ErrorKind::NoAcknowledge(
            NoAcknowledgeSource::Address,
        )));
        assert_eq!(
            d.write(0x36, &[], true, Instant::ZERO),
            Err(TransferError::Nack)
        );
    }

    #[test]
    fn data_nack_is_short_write() {
        let mut d = driver(Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)));
        assert_eq!(d.write(0x36, &[1, 2], true, Instant::ZERO), Ok(0));
    }

    #[test]
    fn arbitration_loss_is_bus_error() {
        let mut d = driver(Some(ErrorKind::ArbitrationLoss));
        let mut buf = [0u8; 2];
        assert_eq!(
            d.read(0x36, &mut buf, true, Instant::ZERO),
            Err(TransferError::Bus)
        );
    }

    #[test]
    fn read_fills_buffer() {
        let mut d = driver(None);
        let mut buf = [0u8; 3];
        assert_eq!(d.read(0x36, &mut buf, true, Instant::ZERO), Ok(3));
        assert_eq!(buf, [0x42; 3]);
    }

    #[test]
    fn transfers_fail_until_first_init() {
        let mut d = HalI2cDriver::new(|| Ok::<_, Infallible>(fake(None)));
        assert_eq!(d.builds(), 0);
        assert_eq!(
            d.write(0x36, &[1], true, Instant::ZERO),
            Err(TransferError::Bus)
        );
        assert_eq!(d.init(), Ok(()));
        assert_eq!(d.write(0x36, &[1], true, Instant::ZERO), Ok(1));
    }

    #[test]
    fn lapsed_watchdog_rebuilds_peripheral() {
        let dropped = Rc::new(Cell::new(0));
        let shared = dropped.clone();
        let hal = HalI2cDriver::new(move || {
            Ok::<_, Infallible>(FakeI2c {
                fail_with: None,
                written: Vec::new(),
                dropped: shared.clone(),
            })
        });
        let time = FakeTime::default();
        let mut bus = I2cInterface::new(hal, time.clone(), BusConfig::default());

        bus.init_sensor_bus();
        assert_eq!(bus.driver().builds(), 1);
        assert_eq!(bus.write_i2c_data(0x36, &[7]), BusResponse::Ok);
        assert_eq!(bus.driver().peripheral().unwrap().written, vec![7]);

        time.advance_ms(I2C_WATCHDOG_TIMEOUT.as_millis() as u64 + 1);
        assert!(bus.check_interface_watchdog());

        // Old peripheral dropped, a fresh one built in its place.
        assert_eq!(dropped.get(), 1);
        assert_eq!(bus.driver().builds(), 2);
        assert_eq!(bus.bus_resets(), 1);
        assert!(bus.driver().peripheral().unwrap().written.is_empty());
        assert_eq!(bus.check_i2c_address(0x36), BusResponse::Ok);
    }

    #[test]
    fn failed_rebuild_errors_until_next_reset() {
        let attempts = Rc::new(Cell::new(0u32));
        let counter = attempts.clone();
        let hal = HalI2cDriver::new(move || {
            counter.set(counter.get() + 1);
            // Second build fails, every other one succeeds.
            if counter.get() == 2 {
                Err("driver install failed")
            } else {
                Ok(fake(None))
            }
        });
        let time = FakeTime::default();
        let mut bus = I2cInterface::new(hal, time.clone(), BusConfig::default());
        bus.init_sensor_bus();

        bus.reset_sensor_bus();
        assert!(bus.driver().peripheral().is_none());
        assert_eq!(bus.check_i2c_address(0x36), BusResponse::Error);

        // The watchdog stays armed, so the next lapse retries the build.
        time.advance_ms(I2C_WATCHDOG_TIMEOUT.as_millis() as u64 + 1);
        assert!(bus.check_interface_watchdog());
        assert_eq!(attempts.get(), 3);
        assert_eq!(bus.check_i2c_address(0x36), BusResponse::Ok);
    }
}
