//! Function-pointer finite state machine engine for the sampling cycle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                         │
//! │  ┌────────────┬───────────┬──────────┬───────────────────┬────────┐ │
//! │  │ StateId    │ on_enter  │ on_exit  │ on_update         │terminal│ │
//! │  ├────────────┼───────────┼──────────┼───────────────────┼────────┤ │
//! │  │ Monitoring │ fn(ctx)   │ —        │ fn(ctx)->Option<> │ no     │ │
//! │  │ Sampling   │ fn(ctx)   │ —        │ fn(ctx)->Option<> │ no     │ │
//! │  │ Cooldown   │ fn(ctx)   │ —        │ fn(ctx)->Option<> │ no     │ │
//! │  │ SafeIdle   │ fn(ctx)   │ —        │ fn(ctx)->Option<> │ yes    │ │
//! │  └────────────┴───────────┴──────────┴───────────────────┴────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `tick()` runs the current row's `on_update`. A returned `Some(next)`
//! runs the current `on_exit`, switches, then runs `on_enter` of `next`.
//! A terminal row is never left, whether its own handler or
//! [`Fsm::force_transition`] asks.

pub mod context;
pub mod states;

use context::CycleContext;
use log::{info, warn};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Phases of the sampling cycle.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Monitoring = 0,
    Sampling = 1,
    Cooldown = 2,
    SafeIdle = 3,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 4;

    /// Convert an index back to `StateId`. Out-of-range indices assert in
    /// debug builds and map to `SafeIdle` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Monitoring,
            1 => Self::Sampling,
            2 => Self::Cooldown,
            3 => Self::SafeIdle,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::SafeIdle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut CycleContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut CycleContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
    /// Once entered, only a power cycle leaves this state.
    pub terminal: bool,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// One row per state, in `StateId` order.
    table: [StateDescriptor; StateId::COUNT],
    current: StateId,
    /// FSM ticks since construction.
    ticks: u64,
    /// Value of `ticks` when `current` was entered.
    entered_at: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, row)| row.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial,
            ticks: 0,
            entered_at: 0,
        }
    }

    /// Enter the initial state. Call once, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut CycleContext) {
        info!("FSM: starting in {}", self.row(self.current).name);
        if let Some(enter) = self.row(self.current).on_enter {
            enter(ctx);
        }
    }

    /// Run the current state's update handler and follow its verdict.
    pub fn tick(&mut self, ctx: &mut CycleContext) {
        self.ticks += 1;
        ctx.total_ticks = self.ticks;
        ctx.ticks_in_state = self.ticks - self.entered_at;

        if let Some(next) = (self.row(self.current).on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Transition on an outcome the handlers cannot see (pump accepted a
    /// start, pump stopped, fault escalated). No-op if already there.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut CycleContext) {
        if next != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.row(self.current).terminal
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.ticks - self.entered_at
    }

    fn row(&self, id: StateId) -> &StateDescriptor {
        &self.table[id as usize]
    }

    fn transition(&mut self, next: StateId, ctx: &mut CycleContext) {
        let from = self.row(self.current);
        let to = self.row(next);
        if from.terminal {
            warn!("FSM: {} is terminal, ignoring move to {}", from.name, to.name);
            return;
        }
        info!("FSM: {} -> {}", from.name, to.name);

        if let Some(exit) = from.on_exit {
            exit(ctx);
        }
        self.current = next;
        self.entered_at = self.ticks;
        ctx.ticks_in_state = 0;
        if let Some(enter) = self.row(next).on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::{CycleContext, PumpCommand};
    use super::*;
    use crate::clock::Tick;
    use crate::control::detector::{CrossingEvent, DetectorEvent};
    use crate::drivers::pump::{PumpState, StopReason};
    use crate::error::SystemFault;

    fn make_fsm() -> Fsm {
        Fsm::new(states::build_state_table(), StateId::Monitoring)
    }

    fn crossing(t: u64) -> Option<DetectorEvent> {
        Some(DetectorEvent::Crossing(CrossingEvent {
            timestamp: Tick(t),
            triggering_level: 130.0,
        }))
    }

    fn cycle(
        fsm: &mut Fsm,
        ctx: &mut CycleContext,
        t: u64,
        event: Option<DetectorEvent>,
        pump: PumpState,
    ) -> PumpCommand {
        ctx.begin_cycle(Tick(t), event, pump, None);
        fsm.tick(ctx);
        ctx.command
    }

    #[test]
    fn starts_in_monitoring() {
        let fsm = make_fsm();
        assert_eq!(fsm.current_state(), StateId::Monitoring);
        assert!(!fsm.is_terminal());
    }

    #[test]
    fn tick_counts_time_in_state() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        cycle(&mut fsm, &mut ctx, 1, None, PumpState::Idle);
        cycle(&mut fsm, &mut ctx, 2, None, PumpState::Idle);
        assert_eq!(fsm.ticks_in_current_state(), 2);
        assert_eq!(ctx.total_ticks, 2);
    }

    #[test]
    fn crossing_requests_start() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);

        assert_eq!(cycle(&mut fsm, &mut ctx, 1, None, PumpState::Idle), PumpCommand::Hold);
        assert_eq!(
            cycle(&mut fsm, &mut ctx, 2, crossing(2), PumpState::Idle),
            PumpCommand::Start
        );
        assert!(ctx.pending.is_some());
        // Stays in Monitoring until the loop confirms the pump started.
        assert_eq!(fsm.current_state(), StateId::Monitoring);
    }

    #[test]
    fn rearm_withdraws_pending_request() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::Cooldown, &mut ctx);

        let cooling = PumpState::Cooldown { remaining_ticks: 3 };
        assert_eq!(cycle(&mut fsm, &mut ctx, 1, crossing(1), cooling), PumpCommand::Start);
        assert_eq!(cycle(&mut fsm, &mut ctx, 2, None, cooling), PumpCommand::Start);
        assert_eq!(
            cycle(
                &mut fsm,
                &mut ctx,
                3,
                Some(DetectorEvent::Rearmed(Tick(3))),
                cooling
            ),
            PumpCommand::Hold
        );
        assert_eq!(ctx.pending, None);
    }

    #[test]
    fn sampling_stops_on_rearm() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::Sampling, &mut ctx);

        let running = PumpState::Running { elapsed_ticks: 2 };
        assert_eq!(cycle(&mut fsm, &mut ctx, 1, None, running), PumpCommand::Hold);
        assert_eq!(
            cycle(
                &mut fsm,
                &mut ctx,
                2,
                Some(DetectorEvent::Rearmed(Tick(2))),
                running
            ),
            PumpCommand::Stop(StopReason::LevelRecovered)
        );
    }

    #[test]
    fn sampling_follows_pump_into_cooldown() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::Sampling, &mut ctx);

        cycle(
            &mut fsm,
            &mut ctx,
            1,
            None,
            PumpState::Cooldown { remaining_ticks: 2 },
        );
        assert_eq!(fsm.current_state(), StateId::Cooldown);
    }

    #[test]
    fn cooldown_returns_to_monitoring_when_pump_idle() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::Cooldown, &mut ctx);

        cycle(
            &mut fsm,
            &mut ctx,
            1,
            None,
            PumpState::Cooldown { remaining_ticks: 1 },
        );
        assert_eq!(fsm.current_state(), StateId::Cooldown);
        cycle(&mut fsm, &mut ctx, 2, None, PumpState::Idle);
        assert_eq!(fsm.current_state(), StateId::Monitoring);
    }

    #[test]
    fn latched_fault_sends_any_state_to_safe_idle() {
        for start_state in [StateId::Monitoring, StateId::Sampling, StateId::Cooldown] {
            let mut fsm = make_fsm();
            let mut ctx = CycleContext::new();
            fsm.start(&mut ctx);
            fsm.force_transition(start_state, &mut ctx);

            ctx.begin_cycle(
                Tick(1),
                crossing(1),
                PumpState::Idle,
                Some(SystemFault::SensorFailure),
            );
            fsm.tick(&mut ctx);
            assert_eq!(
                fsm.current_state(),
                StateId::SafeIdle,
                "Expected SafeIdle from {:?}",
                start_state
            );
            assert_eq!(ctx.command, PumpCommand::Hold);
            assert_eq!(ctx.pending, None);
        }
    }

    #[test]
    fn safe_idle_is_terminal() {
        let mut fsm = make_fsm();
        let mut ctx = CycleContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::SafeIdle, &mut ctx);
        assert!(fsm.is_terminal());

        fsm.force_transition(StateId::Monitoring, &mut ctx);
        assert_eq!(fsm.current_state(), StateId::SafeIdle);

        for t in 1..20 {
            assert_eq!(
                cycle(&mut fsm, &mut ctx, t, crossing(t), PumpState::Idle),
                PumpCommand::Hold
            );
        }
        assert_eq!(fsm.current_state(), StateId::SafeIdle);
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            assert_eq!(StateId::from_index(i) as usize, i);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn state_id_from_invalid_index_is_safe_idle() {
        assert_eq!(StateId::from_index(99), StateId::SafeIdle);
    }
}
