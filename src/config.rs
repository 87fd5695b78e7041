//! System configuration parameters
//!
//! All tunable parameters for the sampling apparatus. Loaded once at
//! startup by an external loader (JSON file, flash blob) and treated as
//! immutable for the life of a run. `Default` carries the bench apparatus
//! values; nothing in the core hard-codes them.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::datalog::LOG_BUFFER_CAP;

/// Maximum number of calibration points (stack-allocated).
pub const MAX_CAL_POINTS: usize = 8;

/// Records of the log buffer reserved for safety-relevant records.
const CRITICAL_RESERVE: usize = 8;

/// Largest calibrated magnitude accepted, in millimetres.
const MAX_ABS_LEVEL_MM: f32 = 100_000.0;

/// Hysteresis band for the crossing detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Level at which a crossing-up becomes eligible.
    pub rising_mm: f32,
    /// Level at or below which the detector re-arms.
    pub falling_mm: f32,
    /// Consecutive ticks at or above `rising_mm` before a crossing fires.
    pub min_hold_ticks: u32,
}

/// One point of the piecewise-linear calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalPoint {
    pub raw: u16,
    pub level_mm: f32,
}

/// Piecewise-linear raw → millimetre curve. Two points is plain linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Points ordered by strictly increasing `raw`.
    pub points: heapless::Vec<CalPoint, MAX_CAL_POINTS>,
}

impl Calibration {
    /// Two-point linear calibration.
    pub fn linear(low: CalPoint, high: CalPoint) -> Self {
        let mut points = heapless::Vec::new();
        let _ = points.push(low);
        let _ = points.push(high);
        Self { points }
    }
}

/// Inclusive raw-code operating band of the transducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRange {
    pub min_raw: u16,
    pub max_raw: u16,
}

impl RawRange {
    pub fn contains(&self, raw: u16) -> bool {
        (self.min_raw..=self.max_raw).contains(&raw)
    }
}

/// Buffering and retry policy of the data logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Sample records buffered before a flush is forced.
    pub max_buffered_samples: u8,
    /// Age (ticks) of the oldest buffered record before a flush is forced.
    pub max_buffer_age_ticks: u32,
    /// Wait before the single flush retry (milliseconds).
    pub retry_backoff_ms: u32,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Detection ---
    pub threshold: Threshold,

    // --- Sensor ---
    pub calibration: Calibration,
    /// Raw codes outside this band are rejected as `OutOfRange`.
    pub sensor_fault_range: RawRange,
    /// Raw conversions averaged per reading (1–16).
    pub oversample: u8,
    /// Polls allowed per raw conversion before the reading is `Stale`.
    pub read_poll_budget: u8,

    // --- Pump ---
    /// Maximum ticks the pump may run per activation.
    pub pump_run_ticks: u32,
    /// Ticks the pump must rest after every stop.
    pub pump_cooldown_ticks: u32,
    /// Drive duty cycle while running (1–100%).
    pub pump_duty_percent: u8,
    /// Ticks at the start of each activation driven at `prime_duty_percent`.
    /// Counts against `pump_run_ticks`; 0 disables priming.
    pub prime_ticks: u32,
    /// Drive duty cycle while priming (1–100%).
    pub prime_duty_percent: u8,

    // --- Logging ---
    /// A sample record is logged every this many ticks.
    pub sample_interval_ticks: u32,
    pub logger: LoggerConfig,

    // --- Fault escalation ---
    /// Consecutive sensor-fault ticks tolerated before lockout.
    pub sensor_fault_streak_limit: u32,
    /// Consecutive failed pump attempts tolerated before lockout.
    pub pump_fault_streak_limit: u32,

    // --- Timing ---
    /// Wall-clock period of one tick (milliseconds), used by the runner.
    pub tick_period_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // 5.0 in trigger with ±0.2 in band, expressed in mm
            threshold: Threshold {
                rising_mm: 132.0,
                falling_mm: 122.0,
                min_hold_ticks: 3,
            },

            // Fuel-sender ADC: 11000 = empty, 48000 = 10 in (254 mm)
            calibration: Calibration::linear(
                CalPoint { raw: 11_000, level_mm: 0.0 },
                CalPoint { raw: 48_000, level_mm: 254.0 },
            ),
            sensor_fault_range: RawRange {
                min_raw: 8_000,
                max_raw: 52_000,
            },
            oversample: 5,
            read_poll_budget: 3,

            // Pump
            pump_run_ticks: 30,
            pump_cooldown_ticks: 10,
            pump_duty_percent: 76, // 50000 / 65535
            prime_ticks: 2,
            prime_duty_percent: 100,

            // Logging
            sample_interval_ticks: 1,
            logger: LoggerConfig {
                max_buffered_samples: 8,
                max_buffer_age_ticks: 30,
                retry_backoff_ms: 50,
            },

            // Escalation
            sensor_fault_streak_limit: 5,
            pump_fault_streak_limit: 20,

            // Timing
            tick_period_ms: 1000, // 1 Hz
        }
    }
}

impl SystemConfig {
    /// Reject configurations that would make the controller unsafe or
    /// degenerate. Values are never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.threshold;
        if !t.rising_mm.is_finite() || !t.falling_mm.is_finite() {
            return Err(ConfigError::ValidationFailed("thresholds must be finite"));
        }
        if t.falling_mm >= t.rising_mm {
            return Err(ConfigError::ValidationFailed(
                "falling_mm must be below rising_mm",
            ));
        }
        if t.min_hold_ticks == 0 {
            return Err(ConfigError::ValidationFailed("min_hold_ticks must be >= 1"));
        }

        let points = &self.calibration.points;
        if points.len() < 2 {
            return Err(ConfigError::ValidationFailed(
                "calibration needs at least 2 points",
            ));
        }
        if points.windows(2).any(|w| w[0].raw >= w[1].raw) {
            return Err(ConfigError::ValidationFailed(
                "calibration raw codes must strictly increase",
            ));
        }
        if points
            .iter()
            .any(|p| !p.level_mm.is_finite() || p.level_mm.abs() > MAX_ABS_LEVEL_MM)
        {
            return Err(ConfigError::ValidationFailed(
                "calibration levels must be finite and within ±100 m",
            ));
        }

        if self.sensor_fault_range.min_raw >= self.sensor_fault_range.max_raw {
            return Err(ConfigError::ValidationFailed(
                "sensor_fault_range must be non-empty",
            ));
        }
        if !(1..=16).contains(&self.oversample) {
            return Err(ConfigError::ValidationFailed("oversample must be 1–16"));
        }
        if self.read_poll_budget == 0 {
            return Err(ConfigError::ValidationFailed("read_poll_budget must be >= 1"));
        }

        if self.pump_run_ticks == 0 {
            return Err(ConfigError::ValidationFailed("pump_run_ticks must be >= 1"));
        }
        if self.pump_cooldown_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "pump_cooldown_ticks must be >= 1",
            ));
        }
        if !(1..=100).contains(&self.pump_duty_percent) {
            return Err(ConfigError::ValidationFailed("pump_duty_percent must be 1–100"));
        }
        if self.prime_ticks >= self.pump_run_ticks {
            return Err(ConfigError::ValidationFailed(
                "prime_ticks must be below pump_run_ticks",
            ));
        }
        if !(1..=100).contains(&self.prime_duty_percent) {
            return Err(ConfigError::ValidationFailed("prime_duty_percent must be 1–100"));
        }

        if self.sample_interval_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "sample_interval_ticks must be >= 1",
            ));
        }
        let max_samples = LOG_BUFFER_CAP - CRITICAL_RESERVE;
        if self.logger.max_buffered_samples == 0
            || usize::from(self.logger.max_buffered_samples) > max_samples
        {
            return Err(ConfigError::ValidationFailed(
                "logger.max_buffered_samples must be 1–24",
            ));
        }
        if self.logger.max_buffer_age_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "logger.max_buffer_age_ticks must be >= 1",
            ));
        }
        if self.logger.retry_backoff_ms > 1_000 {
            return Err(ConfigError::ValidationFailed(
                "logger.retry_backoff_ms must be <= 1000",
            ));
        }

        if self.sensor_fault_streak_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "sensor_fault_streak_limit must be >= 1",
            ));
        }
        if self.pump_fault_streak_limit <= self.pump_cooldown_ticks {
            return Err(ConfigError::ValidationFailed(
                "pump_fault_streak_limit must exceed pump_cooldown_ticks",
            ));
        }

        if !(10..=60_000).contains(&self.tick_period_ms) {
            return Err(ConfigError::ValidationFailed("tick_period_ms must be 10–60000"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Decode and validate a postcard blob (flash-stored configuration).
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Encode as a postcard blob after validating.
    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        self.validate()?;
        postcard::to_allocvec(self).map_err(|_| ConfigError::IoError)
    }
}
