//! GPIO / peripheral pin assignments for the sensor pod board.
//!
//! Single source of truth: `main` builds every bus and driver from these
//! numbers rather than hard-coding them.

// ---------------------------------------------------------------------------
// SCD30 CO2 / temperature / humidity (bit-banged I2C)
// ---------------------------------------------------------------------------

/// Open-drain data line, external 10 kΩ pull-up.
pub const SCD30_SDA_GPIO: i32 = 4;
/// Open-drain clock line, external 10 kΩ pull-up.
pub const SCD30_SCL_GPIO: i32 = 5;
/// Digital output: HIGH powers the sensor through a load switch.
pub const SCD30_POWER_GPIO: i32 = 6;

// ---------------------------------------------------------------------------
// STEMMA soil sensor (hardware I2C0)
// ---------------------------------------------------------------------------

pub const SOIL_SDA_GPIO: i32 = 8;
pub const SOIL_SCL_GPIO: i32 = 9;
pub const SOIL_I2C_BAUD_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Ultrasonic distance sensor (UART1)
// ---------------------------------------------------------------------------

/// UART RX from the sensor's TX.
pub const SONAR_RX_GPIO: i32 = 18;
/// Digital output: HIGH selects continuous serial output.
pub const SONAR_TRIGGER_GPIO: i32 = 17;
pub const SONAR_BAUD: u32 = 9_600;
