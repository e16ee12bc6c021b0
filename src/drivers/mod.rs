//! Platform helpers shared by the executors.

pub mod task_pin;
