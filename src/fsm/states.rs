//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers, no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  MONITORING ──[pump started]──▶ SAMPLING
//!      ▲                              │
//!      │                  [re-armed → stop] / [pump cut off]
//!      │                              ▼
//!      └──────[pump idle]────────  COOLDOWN ──[pump started]──▶ SAMPLING
//!
//!  Any state ──[fault latched]──▶ SAFE_IDLE (terminal)
//! ```
//!
//! Handlers never touch the pump. They leave a [`PumpCommand`] in the
//! context; the control loop applies it and forces the transitions that
//! depend on whether the pump accepted it.

use super::context::{CycleContext, PumpCommand};
use super::{StateDescriptor, StateId};
use crate::drivers::pump::{PumpState, StopReason};
use log::{error, info};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Monitoring
        StateDescriptor {
            id: StateId::Monitoring,
            name: "Monitoring",
            on_enter: Some(monitoring_enter),
            on_exit: None,
            on_update: monitoring_update,
            terminal: false,
        },
        // Index 1: Sampling
        StateDescriptor {
            id: StateId::Sampling,
            name: "Sampling",
            on_enter: Some(sampling_enter),
            on_exit: None,
            on_update: sampling_update,
            terminal: false,
        },
        // Index 2: Cooldown
        StateDescriptor {
            id: StateId::Cooldown,
            name: "Cooldown",
            on_enter: Some(cooldown_enter),
            on_exit: None,
            on_update: cooldown_update,
            terminal: false,
        },
        // Index 3: SafeIdle
        StateDescriptor {
            id: StateId::SafeIdle,
            name: "SafeIdle",
            on_enter: Some(safe_idle_enter),
            on_exit: None,
            on_update: safe_idle_update,
            terminal: true,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  MONITORING: pump idle, waiting for a crossing
// ═══════════════════════════════════════════════════════════════════════════

fn monitoring_enter(_ctx: &mut CycleContext) {
    info!("MONITORING: watching level");
}

fn monitoring_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.has_fault() {
        return Some(StateId::SafeIdle);
    }

    ctx.track_request();
    request_start(ctx);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAMPLING: pump transferring liquid
// ═══════════════════════════════════════════════════════════════════════════

fn sampling_enter(ctx: &mut CycleContext) {
    info!("SAMPLING: pump running since tick {}", ctx.now);
}

fn sampling_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.has_fault() {
        return Some(StateId::SafeIdle);
    }

    // The pump cut itself off (run limit or drive fault).
    if !ctx.pump.is_running() {
        return Some(StateId::Cooldown);
    }

    if ctx.rearmed {
        ctx.command = PumpCommand::Stop(StopReason::LevelRecovered);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COOLDOWN: pump resting; a new request waits it out
// ═══════════════════════════════════════════════════════════════════════════

fn cooldown_enter(_ctx: &mut CycleContext) {
    info!("COOLDOWN: pump resting");
}

fn cooldown_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.has_fault() {
        return Some(StateId::SafeIdle);
    }

    ctx.track_request();
    if ctx.pending.is_some() {
        // Refused with `Cooling` until the pump reaches Idle.
        request_start(ctx);
        return None;
    }

    if ctx.pump == PumpState::Idle {
        return Some(StateId::Monitoring);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFE_IDLE: pump locked out until power cycle; sensing and logging go on
// ═══════════════════════════════════════════════════════════════════════════

fn safe_idle_enter(ctx: &mut CycleContext) {
    ctx.command = PumpCommand::Hold;
    ctx.pending = None;
    match ctx.latched {
        Some(fault) => error!("SAFE IDLE: {fault}, pump locked until power cycle"),
        None => error!("SAFE IDLE: pump locked until power cycle"),
    }
}

fn safe_idle_update(ctx: &mut CycleContext) -> Option<StateId> {
    ctx.command = PumpCommand::Hold;
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn request_start(ctx: &mut CycleContext) {
    if let Some(request) = ctx.pending {
        if !ctx.pump.is_running() {
            if ctx.crossing.is_some() {
                info!(
                    "CROSSING: level {:.1} mm at tick {}, requesting sample",
                    request.triggering_level, request.timestamp
                );
            }
            ctx.command = PumpCommand::Start;
        }
    }
}
