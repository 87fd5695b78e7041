//! Decision logic fed by sensor readings.

pub mod detector;
