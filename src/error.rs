//! Unified error types for the FluidSampler controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level control loop's error handling uniform. All variants are `Copy`
//! so they can be passed through the fault monitor and FSM without
//! allocation.

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The level sensor could not produce a valid reading.
    Sensor(SensorFault),
    /// The pump refused a command.
    Pump(PumpError),
    /// The data logger could not persist records.
    Log(LogError),
    /// A fault was escalated and the pump is locked out.
    System(SystemFault),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Pump(e) => write!(f, "pump: {e}"),
            Self::Log(e) => write!(f, "log: {e}"),
            Self::System(e) => write!(f, "system: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// Raw code outside the transducer's operating band.
    OutOfRange,
    /// The conversion did not complete within its poll budget.
    Stale,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::Stale => write!(f, "reading stale"),
        }
    }
}

impl From<SensorFault> for Error {
    fn from(e: SensorFault) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

/// Low-level output failure reported by an [`ActuatorPort`](crate::app::ports::ActuatorPort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// Direction GPIO set failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pump errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpError {
    /// The pump is still in its post-run cooldown.
    Cooling,
    /// The pump is fault-locked until power cycle.
    Locked,
    /// The pump is already running.
    AlreadyRunning,
    /// The actuator output rejected the drive command.
    DriveFailed(ActuatorError),
}

impl fmt::Display for PumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cooling => write!(f, "cooling down"),
            Self::Locked => write!(f, "fault locked"),
            Self::AlreadyRunning => write!(f, "already running"),
            Self::DriveFailed(e) => write!(f, "drive failed: {e}"),
        }
    }
}

impl From<PumpError> for Error {
    fn from(e: PumpError) -> Self {
        Self::Pump(e)
    }
}

// ---------------------------------------------------------------------------
// Logger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    /// Storage already failed this tick; records stay buffered for the next.
    WriteFailed,
    /// Storage rejected a flush and its retry. The logger is degraded and
    /// the oldest buffered samples were shed.
    Degraded,
    /// Record timestamp precedes the last appended record.
    OutOfOrder,
    /// Buffer is full of records that must not be dropped.
    Overflow,
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed => write!(f, "storage write failed"),
            Self::Degraded => write!(f, "degraded, samples dropped"),
            Self::OutOfOrder => write!(f, "record out of timestamp order"),
            Self::Overflow => write!(f, "buffer overflow"),
        }
    }
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        Self::Log(e)
    }
}

// ---------------------------------------------------------------------------
// System faults
// ---------------------------------------------------------------------------

/// Escalated faults. Entering any of these locks the pump until power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFault {
    /// The sensor failed for longer than the configured streak.
    SensorFailure,
    /// Pump start attempts or drive writes kept failing.
    PumpStuck,
}

impl fmt::Display for SystemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorFailure => write!(f, "sustained sensor failure"),
            Self::PumpStuck => write!(f, "pump stuck"),
        }
    }
}

impl From<SystemFault> for Error {
    fn from(e: SystemFault) -> Self {
        Self::System(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
