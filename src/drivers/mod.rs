//! Actuator drivers.

pub mod pump;
