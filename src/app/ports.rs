//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlLoop (domain)
//! ```
//!
//! Driven adapters (level transducer, pump bridge, log medium, config
//! source) implement these traits. The [`ControlLoop`](super::control_loop::ControlLoop)
//! consumes them through generics passed in at each tick, so the domain
//! core never touches hardware directly and owns no ambient globals.

use crate::config::SystemConfig;
use crate::error::ActuatorError;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: transducer → domain)
// ───────────────────────────────────────────────────────────────

/// Raw conversion outcome that is not a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawReadError {
    /// Conversion still in progress; poll again.
    NotReady,
    /// The bus or converter reported an error.
    Bus,
}

/// Read-side port: one non-blocking raw conversion per call.
pub trait SensorPort {
    fn read_raw(&mut self) -> Result<u16, RawReadError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → pump bridge)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the transfer pump.
///
/// There is deliberately no "run for N" primitive: the
/// [`PumpActuator`](crate::drivers::pump::PumpActuator) re-asserts the
/// output every tick and owns the run-time cutoff.
pub trait ActuatorPort {
    /// Energise the pump forward at `duty_percent` (1–100).
    fn drive_pump(&mut self, duty_percent: u8) -> Result<(), ActuatorError>;

    /// De-energise the pump.
    fn stop_pump(&mut self) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Log storage port (driven adapter: domain → removable medium)
// ───────────────────────────────────────────────────────────────

/// Append-only record medium (SD card file, flash ring, …).
///
/// Implementations open the medium in append mode; prior content is never
/// rewritten. Each `append` call carries exactly one complete line.
pub trait LogStorage {
    /// Append one encoded record line.
    fn append(&mut self, line: &[u8]) -> Result<(), StorageError>;

    /// Make every appended line durable.
    fn flush(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: persistent config → domain)
// ───────────────────────────────────────────────────────────────

/// Loads system configuration once at startup.
///
/// Implementations MUST validate before returning. Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`LogStorage`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The medium reported an I/O error.
    Io,
    /// The write did not complete within its budget.
    Timeout,
    /// The medium is full.
    Full,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Timeout => write!(f, "write timed out"),
            Self::Full => write!(f, "storage full"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
