//! Fault monitor.
//!
//! The monitor runs **every tick after the pump has been ticked** and
//! aggregates the health of the sensor, the pump and the logger into
//! consecutive-failure streaks.
//!
//! ## Fault lifecycle
//!
//! 1. A component reports a failure for this tick (sensor fault, refused
//!    start, drive fault, degraded logger).
//! 2. The monitor sets the matching bit in its active mask and extends the
//!    streak. A healthy tick clears the bit and resets the streak.
//! 3. A streak exceeding its configured limit escalates to a
//!    [`SystemFault`]. Escalation latches: the control loop locks the pump
//!    and parks in safe idle until power cycle.
//!
//! Logger degradation is observed separately, after the tick's records have
//! been written, through [`FaultMonitor::observe_storage`]. It is reported on
//! its rising edge only and never escalates. Losing the record medium must
//! not stop the apparatus from failing safe.

use log::{error, info};

use crate::config::SystemConfig;
use crate::error::{PumpError, SensorFault, SystemFault};

/// Health signals collected during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub sensor: Result<(), SensorFault>,
    /// Outcome of a start attempt, if one was made this tick.
    pub pump_start: Option<Result<(), PumpError>>,
    /// The actuator output failed while the pump was being driven or held off.
    pub drive_fault: bool,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            sensor: Ok(()),
            pump_start: None,
            drive_fault: false,
        }
    }
}

/// What the control loop must act on after [`FaultMonitor::observe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assessment {
    /// Set on the tick a fault escalates; `None` afterwards.
    pub escalate: Option<SystemFault>,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Sensor,
    Pump,
    Storage,
}

impl Signal {
    const fn mask(self) -> u8 {
        match self {
            Self::Sensor => 1 << 0,
            Self::Pump => 1 << 1,
            Self::Storage => 1 << 2,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Pump => "pump",
            Self::Storage => "log storage",
        }
    }
}

pub struct FaultMonitor {
    sensor_limit: u32,
    pump_limit: u32,
    sensor_streak: u32,
    pump_streak: u32,
    /// Bitmask of signals failing on the last observed tick.
    active: u8,
    latched: Option<SystemFault>,
}

impl FaultMonitor {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            sensor_limit: config.sensor_fault_streak_limit,
            pump_limit: config.pump_fault_streak_limit,
            sensor_streak: 0,
            pump_streak: 0,
            active: 0,
            latched: None,
        }
    }

    /// Fold one tick's health into the streaks.
    pub fn observe(&mut self, report: &HealthReport) -> Assessment {
        let sensor_failed = report.sensor.is_err();
        self.sensor_streak = if sensor_failed {
            self.sensor_streak.saturating_add(1)
        } else {
            0
        };
        self.eval_signal(Signal::Sensor, sensor_failed);

        // Consecutive ticks with a refused start or a drive fault. A tick
        // without either breaks the streak.
        let pump_failed = matches!(report.pump_start, Some(Err(_))) || report.drive_fault;
        self.pump_streak = if pump_failed {
            self.pump_streak.saturating_add(1)
        } else {
            0
        };
        self.eval_signal(Signal::Pump, pump_failed);

        let mut assessment = Assessment::default();

        if self.latched.is_none() {
            let fault = if self.sensor_streak > self.sensor_limit {
                Some(SystemFault::SensorFailure)
            } else if self.pump_streak > self.pump_limit {
                Some(SystemFault::PumpStuck)
            } else {
                None
            };
            if let Some(fault) = fault {
                error!(
                    "SAFETY FAULT LATCHED: {fault} (sensor streak {}, pump streak {})",
                    self.sensor_streak, self.pump_streak
                );
                self.latched = Some(fault);
                assessment.escalate = Some(fault);
            }
        }

        assessment
    }

    /// Fold the logger's state after this tick's writes. Returns `true` on
    /// the tick it became degraded.
    pub fn observe_storage(&mut self, degraded: bool) -> bool {
        let was_degraded = self.active & Signal::Storage.mask() != 0;
        self.eval_signal(Signal::Storage, degraded);
        degraded && !was_degraded
    }

    pub fn latched(&self) -> Option<SystemFault> {
        self.latched
    }

    pub fn sensor_streak(&self) -> u32 {
        self.sensor_streak
    }

    pub fn pump_streak(&self) -> u32 {
        self.pump_streak
    }

    /// True if any signal failed on the last observed tick.
    pub fn has_active_faults(&self) -> bool {
        self.active != 0
    }

    fn eval_signal(&mut self, signal: Signal, failing: bool) {
        if failing {
            if self.active & signal.mask() == 0 {
                error!("FAULT SET: {}", signal.name());
            }
            self.active |= signal.mask();
        } else {
            if self.active & signal.mask() != 0 {
                info!("FAULT CLEARED: {}", signal.name());
            }
            self.active &= !signal.mask();
        }
    }
}
