//! Monotonic tick source.
//!
//! One tick is one execution of the control loop's fixed-order cycle. All
//! timing decisions (hold counts, pump run time, cooldown, log ageing) are
//! expressed in ticks so the accounting is exact regardless of wall-clock
//! jitter.

use core::fmt;

/// A monotonic tick timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Self = Self(0);

    /// Ticks elapsed since `earlier` (zero if `earlier` is in the future).
    pub const fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can report the current tick.
pub trait TickSource {
    fn now(&self) -> Tick;
}

/// Counter advanced once per control cycle by its owner.
#[derive(Debug, Default)]
pub struct TickCounter {
    now: Tick,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one tick and return the new timestamp.
    pub fn advance(&mut self) -> Tick {
        self.now = Tick(self.now.0.saturating_add(1));
        self.now
    }
}

impl TickSource for TickCounter {
    fn now(&self) -> Tick {
        self.now
    }
}
