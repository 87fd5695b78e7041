//! Per-cycle context threaded through every FSM handler.
//!
//! `CycleContext` is the single struct that state handlers read from and
//! write to. The control loop fills the inputs (detector events, pump
//! state, latched fault) before each FSM tick and applies the
//! [`PumpCommand`] the handlers leave behind. The pending sample request
//! survives across ticks; everything else is refreshed every cycle.

use log::info;

use crate::clock::Tick;
use crate::control::detector::{CrossingEvent, DetectorEvent};
use crate::drivers::pump::{PumpState, StopReason};
use crate::error::SystemFault;

/// What the control loop should do with the pump after the FSM tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpCommand {
    /// Leave the pump to its own state machine.
    Hold,
    Start,
    Stop(StopReason),
}

pub struct CycleContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Timestamp of the cycle being evaluated.
    pub now: Tick,

    // -- Inputs for this cycle --
    /// Crossing emitted by the detector this tick.
    pub crossing: Option<CrossingEvent>,
    /// The detector re-armed this tick.
    pub rearmed: bool,
    /// Pump state at the start of the cycle.
    pub pump: PumpState,
    pub latched: Option<SystemFault>,

    // -- Carried across cycles --
    /// Crossing not yet served by a pump start.
    pub pending: Option<CrossingEvent>,

    // -- Output --
    pub command: PumpCommand,
}

impl Default for CycleContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleContext {
    pub fn new() -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            now: Tick::ZERO,
            crossing: None,
            rearmed: false,
            pump: PumpState::Idle,
            latched: None,
            pending: None,
            command: PumpCommand::Hold,
        }
    }

    /// Load this cycle's inputs and clear last cycle's command.
    pub fn begin_cycle(
        &mut self,
        now: Tick,
        event: Option<DetectorEvent>,
        pump: PumpState,
        latched: Option<SystemFault>,
    ) {
        self.now = now;
        self.crossing = match event {
            Some(DetectorEvent::Crossing(c)) => Some(c),
            _ => None,
        };
        self.rearmed = matches!(event, Some(DetectorEvent::Rearmed(_)));
        self.pump = pump;
        self.latched = latched;
        self.command = PumpCommand::Hold;
    }

    /// Record a new crossing as pending, or withdraw the pending request
    /// when the level has already fallen back.
    pub fn track_request(&mut self) {
        if let Some(c) = self.crossing {
            self.pending = Some(c);
        } else if self.rearmed && self.pending.take().is_some() {
            info!("FSM: pending sample request withdrawn, level recovered");
        }
    }

    pub fn has_fault(&self) -> bool {
        self.latched.is_some()
    }
}
