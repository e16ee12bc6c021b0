//! Application boundary.
//!
//! The pod's domain logic (sensor state machines, the cross-core mailbox,
//! the two core executors) reaches hardware and the network only through
//! the **port traits** defined in [`ports`], keeping it fully testable on
//! the host.

pub mod ports;
