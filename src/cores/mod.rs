//! Per-core executors.
//!
//! Each core runs one single-threaded loop. They share nothing but the
//! [`MulticoreMailbox`](crate::messaging::mailbox::MulticoreMailbox).

pub mod core0;
pub mod core1;

pub use core0::NetworkCoreExecutor;
pub use core1::HardwareCoreExecutor;
