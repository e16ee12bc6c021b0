//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter             | Implements          | Connects to                |
//! |---------------------|---------------------|----------------------------|
//! | `channel_transport` | MessageSource       | inbound `embassy-sync` ch. |
//! |                     | MessageSink         | outbound `embassy-sync` ch.|
//! | `log_sink`          | MessageSink         | Serial log output          |
//! | `nvs`               | ConfigPort          | NVS / in-memory store      |
//! | `time`              | TimeSource          | ESP32 system timer         |
//! | `uart`              | SerialRx            | ESP-IDF UART RX FIFO       |

pub mod channel_transport;
pub mod log_sink;
pub mod nvs;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
