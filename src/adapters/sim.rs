//! Simulation adapters for host runs.
//!
//! [`SimTank`] models the sampled reservoir: a steady inflow raises the
//! level, the pump drains it in proportion to its duty, and the transducer
//! reports the level through the inverse of the configured calibration
//! plus optional deterministic noise. Faults can be injected so the
//! simulator exercises the same escalation paths as real hardware.
//!
//! [`FlakyStorage`] wraps any [`LogStorage`] and can be taken offline.

use log::info;

use crate::app::ports::{ActuatorPort, LogStorage, RawReadError, SensorPort, StorageError};
use crate::config::{CalPoint, SystemConfig};
use crate::error::ActuatorError;

pub struct SimTank {
    level_mm: f32,
    inflow_mm_per_tick: f32,
    /// Drain rate at 100% duty.
    drain_mm_per_tick: f32,
    cal_low: CalPoint,
    cal_high: CalPoint,
    duty: u8,
    noise_raw: u16,
    rng: u32,
    sensor_outage_ticks: u32,
    drive_failures: u32,
    pumped_ticks: u64,
}

impl SimTank {
    pub fn new(config: &SystemConfig, initial_level_mm: f32) -> Self {
        let points = &config.calibration.points;
        let cal_low = points.first().copied().unwrap_or(CalPoint {
            raw: 0,
            level_mm: 0.0,
        });
        let cal_high = points.last().copied().unwrap_or(CalPoint {
            raw: u16::MAX,
            level_mm: 1.0,
        });
        Self {
            level_mm: initial_level_mm,
            inflow_mm_per_tick: 1.0,
            drain_mm_per_tick: 5.0,
            cal_low,
            cal_high,
            duty: 0,
            noise_raw: 0,
            rng: 0x2545_F491,
            sensor_outage_ticks: 0,
            drive_failures: 0,
            pumped_ticks: 0,
        }
    }

    pub fn with_inflow(mut self, mm_per_tick: f32) -> Self {
        self.inflow_mm_per_tick = mm_per_tick;
        self
    }

    pub fn with_drain(mut self, mm_per_tick: f32) -> Self {
        self.drain_mm_per_tick = mm_per_tick;
        self
    }

    /// Peak raw-code noise added to every conversion.
    pub fn with_noise(mut self, raw_amplitude: u16) -> Self {
        self.noise_raw = raw_amplitude;
        self
    }

    /// Advance the physics by one tick.
    pub fn step(&mut self) {
        self.level_mm += self.inflow_mm_per_tick;
        if self.duty > 0 {
            self.level_mm -= self.drain_mm_per_tick * f32::from(self.duty) / 100.0;
            self.pumped_ticks += 1;
        }
        self.level_mm = self.level_mm.max(0.0);
        self.sensor_outage_ticks = self.sensor_outage_ticks.saturating_sub(1);
    }

    /// Conversions never complete for the next `ticks` ticks.
    pub fn inject_sensor_outage(&mut self, ticks: u32) {
        info!("SIM: sensor outage for {ticks} ticks");
        self.sensor_outage_ticks = ticks;
    }

    /// The next `count` drive commands fail.
    pub fn inject_drive_failures(&mut self, count: u32) {
        info!("SIM: {count} drive failures injected");
        self.drive_failures = count;
    }

    pub fn set_level(&mut self, level_mm: f32) {
        self.level_mm = level_mm;
    }

    pub fn level_mm(&self) -> f32 {
        self.level_mm
    }

    pub fn is_pumping(&self) -> bool {
        self.duty > 0
    }

    /// Ticks the pump was energised while the physics advanced.
    pub fn pumped_ticks(&self) -> u64 {
        self.pumped_ticks
    }

    fn level_to_raw(&self, level_mm: f32) -> f32 {
        let span_mm = self.cal_high.level_mm - self.cal_low.level_mm;
        if span_mm == 0.0 {
            return f32::from(self.cal_low.raw);
        }
        let span_raw = f32::from(self.cal_high.raw) - f32::from(self.cal_low.raw);
        f32::from(self.cal_low.raw) + (level_mm - self.cal_low.level_mm) / span_mm * span_raw
    }

    /// Uniform offset in `-noise_raw..=noise_raw` (xorshift32).
    fn noise(&mut self) -> f32 {
        if self.noise_raw == 0 {
            return 0.0;
        }
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        let span = u32::from(self.noise_raw) * 2 + 1;
        (self.rng % span) as f32 - f32::from(self.noise_raw)
    }
}

impl SensorPort for SimTank {
    fn read_raw(&mut self) -> Result<u16, RawReadError> {
        if self.sensor_outage_ticks > 0 {
            return Err(RawReadError::NotReady);
        }
        let raw = self.level_to_raw(self.level_mm) + self.noise();
        Ok(raw.round().clamp(0.0, f32::from(u16::MAX)) as u16)
    }
}

impl ActuatorPort for SimTank {
    fn drive_pump(&mut self, duty_percent: u8) -> Result<(), ActuatorError> {
        if self.drive_failures > 0 {
            self.drive_failures -= 1;
            self.duty = 0;
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.duty = duty_percent.min(100);
        Ok(())
    }

    fn stop_pump(&mut self) -> Result<(), ActuatorError> {
        self.duty = 0;
        Ok(())
    }
}

/// Storage wrapper that can be switched offline.
pub struct FlakyStorage<S> {
    inner: S,
    offline: bool,
    rejected: u32,
}

impl<S: LogStorage> FlakyStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            offline: false,
            rejected: 0,
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        if offline != self.offline {
            info!("SIM: storage {}", if offline { "offline" } else { "online" });
        }
        self.offline = offline;
    }

    /// Calls refused while offline.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LogStorage> LogStorage for FlakyStorage<S> {
    fn append(&mut self, line: &[u8]) -> Result<(), StorageError> {
        if self.offline {
            self.rejected += 1;
            return Err(StorageError::Io);
        }
        self.inner.append(line)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.offline {
            self.rejected += 1;
            return Err(StorageError::Timeout);
        }
        self.inner.flush()
    }
}
