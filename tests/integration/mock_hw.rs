//! Mock adapters for integration tests.
//!
//! `MockRig` stands in for the transducer and the pump bridge: the level is
//! set directly by the test and every actuator call is recorded so tests can
//! assert on the full command history. `MemStorage` keeps accepted lines in
//! memory and can be switched offline.

use fluidsampler::app::ports::{
    ActuatorPort, LogStorage, RawReadError, SensorPort, StorageError,
};
use fluidsampler::config::{CalPoint, Calibration, LoggerConfig, RawRange, SystemConfig, Threshold};
use fluidsampler::datalog::LogRecord;
use fluidsampler::error::ActuatorError;

/// Small, fast configuration: 1 raw code = 0.1 mm, raw 1000 = 0 mm.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        threshold: Threshold {
            rising_mm: 50.0,
            falling_mm: 40.0,
            min_hold_ticks: 2,
        },
        calibration: Calibration::linear(
            CalPoint { raw: 1_000, level_mm: 0.0 },
            CalPoint { raw: 2_000, level_mm: 100.0 },
        ),
        sensor_fault_range: RawRange {
            min_raw: 500,
            max_raw: 2_500,
        },
        oversample: 1,
        read_poll_budget: 2,
        pump_run_ticks: 5,
        pump_cooldown_ticks: 3,
        pump_duty_percent: 80,
        prime_ticks: 1,
        prime_duty_percent: 100,
        sample_interval_ticks: 1,
        logger: LoggerConfig {
            max_buffered_samples: 4,
            max_buffer_age_ticks: 10,
            retry_backoff_ms: 0,
        },
        sensor_fault_streak_limit: 3,
        pump_fault_streak_limit: 5,
        tick_period_ms: 100,
    }
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpCall {
    Drive(u8),
    Stop,
}

// ── MockRig ───────────────────────────────────────────────────

pub struct MockRig {
    /// `None` means conversions never complete.
    pub raw: Option<u16>,
    pub fail_drive: bool,
    pub calls: Vec<PumpCall>,
}

#[allow(dead_code)]
impl MockRig {
    pub fn new() -> Self {
        Self {
            raw: Some(1_000),
            fail_drive: false,
            calls: Vec::new(),
        }
    }

    pub fn set_level(&mut self, level_mm: f32) {
        self.raw = Some((1_000.0 + level_mm * 10.0).round() as u16);
    }

    pub fn sensor_offline(&mut self) {
        self.raw = None;
    }

    pub fn pump_on(&self) -> bool {
        matches!(self.calls.last(), Some(PumpCall::Drive(d)) if *d > 0)
    }

    pub fn drive_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, PumpCall::Drive(_)))
            .count()
    }
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockRig {
    fn read_raw(&mut self) -> Result<u16, RawReadError> {
        self.raw.ok_or(RawReadError::NotReady)
    }
}

impl ActuatorPort for MockRig {
    fn drive_pump(&mut self, duty_percent: u8) -> Result<(), ActuatorError> {
        if self.fail_drive {
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.calls.push(PumpCall::Drive(duty_percent));
        Ok(())
    }

    fn stop_pump(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(PumpCall::Stop);
        Ok(())
    }
}

// ── MemStorage ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    pub lines: Vec<String>,
    pub offline: bool,
    pub syncs: u32,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lines
            .iter()
            .map(|l| LogRecord::parse_line(l).expect("logged line must parse"))
            .collect()
    }
}

impl LogStorage for MemStorage {
    fn append(&mut self, line: &[u8]) -> Result<(), StorageError> {
        if self.offline {
            return Err(StorageError::Io);
        }
        self.lines
            .push(String::from_utf8(line.to_vec()).expect("lines are UTF-8"));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.offline {
            return Err(StorageError::Timeout);
        }
        self.syncs += 1;
        Ok(())
    }
}

// ── NoDelay ───────────────────────────────────────────────────

pub struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
