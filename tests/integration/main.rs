//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a slice of the pod
//! against scripted drivers and in-memory transports.  All tests run on
//! the host (x86_64) with no real hardware required.

mod mailbox_tests;
mod mock_hw;
mod pod_flow_tests;
