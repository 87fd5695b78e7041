//! FluidSampler controller library.
//!
//! Level-triggered liquid sampling: read a level transducer, debounce a
//! threshold crossing, run a transfer pump under hard run-time and cooldown
//! limits, and keep an append-only record of everything that happened.
//! The core is hardware agnostic; boards and the host simulator plug in
//! through the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod clock;
pub mod config;
pub mod control;
pub mod datalog;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod sensors;
