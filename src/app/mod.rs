//! Application core: pure domain logic, zero I/O.
//!
//! The sense → decide → act → record cycle lives in [`control_loop`]. All
//! interaction with hardware and storage happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod control_loop;
pub mod ports;
