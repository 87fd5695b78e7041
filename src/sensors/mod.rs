//! Level sensor subsystem.
//!
//! [`SensorReader`] turns raw transducer codes into a calibrated
//! [`SensorSample`] once per tick. It averages `oversample` conversions,
//! rejects any code outside the operating band (never clamps), and gives
//! up with [`SensorFault::Stale`] when a conversion does not complete within
//! its poll budget. No call blocks beyond that fixed budget.

pub mod calibration;

use log::debug;

use crate::app::ports::{RawReadError, SensorPort};
use crate::clock::{Tick, TickSource};
use crate::config::{Calibration, RawRange, SystemConfig};
use crate::error::SensorFault;

/// One calibrated level reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub timestamp: Tick,
    /// Averaged raw code.
    pub raw_value: u16,
    pub level_mm: f32,
}

pub struct SensorReader {
    calibration: Calibration,
    band: RawRange,
    oversample: u8,
    poll_budget: u8,
    total_reads: u32,
}

impl SensorReader {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            calibration: config.calibration.clone(),
            band: config.sensor_fault_range,
            oversample: config.oversample.max(1),
            poll_budget: config.read_poll_budget.max(1),
            total_reads: 0,
        }
    }

    /// Take one reading stamped with the clock's current tick.
    pub fn read(
        &mut self,
        clock: &impl TickSource,
        hw: &mut impl SensorPort,
    ) -> Result<SensorSample, SensorFault> {
        self.total_reads = self.total_reads.saturating_add(1);

        let mut sum: u32 = 0;
        for _ in 0..self.oversample {
            let raw = self.convert_once(hw)?;
            if !self.band.contains(raw) {
                debug!(
                    "SENSOR: raw {} outside {}..={}",
                    raw, self.band.min_raw, self.band.max_raw
                );
                return Err(SensorFault::OutOfRange);
            }
            sum += u32::from(raw);
        }

        let avg = sum as f32 / f32::from(self.oversample);
        Ok(SensorSample {
            timestamp: clock.now(),
            raw_value: avg.round() as u16,
            level_mm: self.calibration.to_mm(avg),
        })
    }

    /// Readings attempted since boot.
    pub fn total_reads(&self) -> u32 {
        self.total_reads
    }

    /// Poll one conversion, bounded by the budget.
    fn convert_once(&self, hw: &mut impl SensorPort) -> Result<u16, SensorFault> {
        for _ in 0..self.poll_budget {
            match hw.read_raw() {
                Ok(raw) => return Ok(raw),
                Err(RawReadError::NotReady) => continue,
                Err(RawReadError::Bus) => return Err(SensorFault::Stale),
            }
        }
        Err(SensorFault::Stale)
    }
}
