//! UART receive adapter for the sonar.
//!
//! Implements [`SerialRx`] over the ESP-IDF UART driver's RX FIFO without
//! blocking: a read that would wait returns `None`.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartRxDriver;

use crate::app::ports::SerialRx;

pub struct UartSerialRx {
    uart: UartRxDriver<'static>,
}

impl UartSerialRx {
    pub fn new(uart: UartRxDriver<'static>) -> Self {
        Self { uart }
    }
}

impl SerialRx for UartSerialRx {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte, NON_BLOCK) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}
