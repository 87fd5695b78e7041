//! Transfer pump actuator with bounded run time and mandatory cooldown.
//!
//! ```text
//!   IDLE ──start──▶ RUNNING{elapsed} ──stop / max run──▶ COOLDOWN{remaining} ──0──▶ IDLE
//!     │                  │                                     │
//!     └──────────────────┴──────────── fault_lock ─────────────┴──▶ FAULT_LOCKED
//! ```
//!
//! ## Safety contract
//!
//! The pump never runs longer than `pump_run_ticks` per activation and never
//! restarts before `pump_cooldown_ticks` have elapsed. The cutoff lives here,
//! not in the caller: [`PumpActuator::tick`] stops the output on its own.
//! The commanded output is re-asserted every tick so a glitched bridge input
//! cannot leave the motor in a state the driver does not know about.
//!
//! ## Priming
//!
//! Every activation starts at `prime_duty_percent` and holds it for the
//! first `prime_ticks` running ticks to pull liquid up the intake line, then
//! the drive drops to `pump_duty_percent`. Priming counts against the run
//! limit.

use log::{debug, info, warn};

use crate::app::ports::ActuatorPort;
use crate::config::SystemConfig;
use crate::error::{ActuatorError, PumpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Running { elapsed_ticks: u32 },
    Cooldown { remaining_ticks: u32 },
    /// Terminal until power cycle.
    FaultLocked,
}

impl PumpState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Why the most recent activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Level fell back to the re-arm threshold.
    LevelRecovered,
    /// The per-activation run limit elapsed.
    MaxRunTime,
    /// An escalated fault locked the pump.
    Lockout,
    /// The drive output failed while running.
    DriveFault,
    /// The controller shut down with the pump running.
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LevelRecovered => "LEVEL_RECOVERED",
            Self::MaxRunTime => "MAX_RUN_TIME",
            Self::Lockout => "LOCKOUT",
            Self::DriveFault => "DRIVE_FAULT",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LEVEL_RECOVERED" => Some(Self::LevelRecovered),
            "MAX_RUN_TIME" => Some(Self::MaxRunTime),
            "LOCKOUT" => Some(Self::Lockout),
            "DRIVE_FAULT" => Some(Self::DriveFault),
            "SHUTDOWN" => Some(Self::Shutdown),
            _ => None,
        }
    }
}

pub struct PumpActuator {
    state: PumpState,
    run_ticks: u32,
    cooldown_ticks: u32,
    duty_percent: u8,
    prime_ticks: u32,
    prime_duty_percent: u8,
    last_stop: Option<StopReason>,
    drive_fault: Option<ActuatorError>,
    activations: u32,
}

impl PumpActuator {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            state: PumpState::Idle,
            run_ticks: config.pump_run_ticks,
            cooldown_ticks: config.pump_cooldown_ticks,
            duty_percent: config.pump_duty_percent,
            prime_ticks: config.prime_ticks,
            prime_duty_percent: config.prime_duty_percent,
            last_stop: None,
            drive_fault: None,
            activations: 0,
        }
    }

    /// Energise the pump. Only legal from `Idle`.
    pub fn start(&mut self, hw: &mut impl ActuatorPort) -> Result<(), PumpError> {
        match self.state {
            PumpState::Idle => {}
            PumpState::Cooldown { .. } => return Err(PumpError::Cooling),
            PumpState::FaultLocked => return Err(PumpError::Locked),
            PumpState::Running { .. } => return Err(PumpError::AlreadyRunning),
        }

        let duty = self.duty_at(0);
        if let Err(e) = hw.drive_pump(duty) {
            warn!("PUMP: drive rejected ({e}), forcing output off");
            if let Err(e) = hw.stop_pump() {
                warn!("PUMP: stop after rejected drive failed ({e})");
            }
            return Err(PumpError::DriveFailed(e));
        }

        self.activations = self.activations.saturating_add(1);
        self.state = PumpState::Running { elapsed_ticks: 0 };
        if self.prime_ticks > 0 {
            info!("PUMP: started, priming at {duty}% for {} ticks", self.prime_ticks);
        } else {
            info!("PUMP: started at {duty}% duty");
        }
        Ok(())
    }

    /// De-energise a running pump and enter cooldown. Returns `false` (and
    /// does nothing) when the pump was not running.
    pub fn stop(&mut self, reason: StopReason, hw: &mut impl ActuatorPort) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.halt(reason, hw);
        true
    }

    /// Advance one tick: run-time cutoff, cooldown countdown, and output
    /// re-assertion. Returns the state after the tick.
    pub fn tick(&mut self, hw: &mut impl ActuatorPort) -> PumpState {
        match self.state {
            PumpState::Running { elapsed_ticks } => {
                let elapsed_ticks = elapsed_ticks.saturating_add(1);
                if elapsed_ticks >= self.run_ticks {
                    info!("PUMP: max run time ({} ticks) reached", self.run_ticks);
                    self.halt(StopReason::MaxRunTime, hw);
                } else if let Err(e) = hw.drive_pump(self.duty_at(elapsed_ticks)) {
                    self.drive_fault = Some(e);
                    self.halt(StopReason::DriveFault, hw);
                } else {
                    if self.prime_ticks > 0 && elapsed_ticks == self.prime_ticks + 1 {
                        debug!("PUMP: primed, running at {}% duty", self.duty_percent);
                    }
                    self.state = PumpState::Running { elapsed_ticks };
                }
            }
            PumpState::Cooldown { remaining_ticks } => {
                let remaining_ticks = remaining_ticks.saturating_sub(1);
                self.state = if remaining_ticks == 0 {
                    PumpState::Idle
                } else {
                    PumpState::Cooldown { remaining_ticks }
                };
                self.reassert_off(hw);
            }
            PumpState::Idle | PumpState::FaultLocked => self.reassert_off(hw),
        }
        self.state
    }

    /// Force the output off and latch `FaultLocked`. Returns `true` when the
    /// pump was running at the time.
    pub fn fault_lock(&mut self, hw: &mut impl ActuatorPort) -> bool {
        let was_running = self.state.is_running();
        if was_running {
            self.last_stop = Some(StopReason::Lockout);
        }
        if let Err(e) = hw.stop_pump() {
            warn!("PUMP: stop during lockout failed ({e})");
        }
        self.state = PumpState::FaultLocked;
        warn!("PUMP: fault locked");
        was_running
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }

    /// Number of successful starts since boot.
    pub fn activations(&self) -> u32 {
        self.activations
    }

    /// Drive failure observed during the last tick, if any. Clears it.
    pub fn take_drive_fault(&mut self) -> Option<ActuatorError> {
        self.drive_fault.take()
    }

    fn duty_at(&self, elapsed_ticks: u32) -> u8 {
        if self.prime_ticks > 0 && elapsed_ticks <= self.prime_ticks {
            self.prime_duty_percent
        } else {
            self.duty_percent
        }
    }

    fn halt(&mut self, reason: StopReason, hw: &mut impl ActuatorPort) {
        if let Err(e) = hw.stop_pump() {
            warn!("PUMP: stop failed ({e})");
            self.drive_fault = Some(e);
        }
        self.last_stop = Some(reason);
        self.state = PumpState::Cooldown {
            remaining_ticks: self.cooldown_ticks,
        };
        info!("PUMP: stopped ({})", reason.as_str());
    }

    fn reassert_off(&mut self, hw: &mut impl ActuatorPort) {
        if let Err(e) = hw.stop_pump() {
            warn!("PUMP: re-assert off failed ({e})");
            self.drive_fault = Some(e);
        }
    }
}
