//! Host time adapters.
//!
//! - [`StdDelay`] implements `embedded_hal::delay::DelayNs` over
//!   `std::thread::sleep`, used for the logger's bounded retry backoff.
//! - [`Pacer`] releases the control loop once per tick period. Deadlines
//!   advance by whole periods so pacing does not drift; an overrun skips
//!   ahead instead of bursting to catch up.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

pub struct Pacer {
    period: Duration,
    next: Instant,
    overruns: u32,
}

impl Pacer {
    pub fn new(period_ms: u32) -> Self {
        let period = Duration::from_millis(u64::from(period_ms));
        Self {
            period,
            next: Instant::now() + period,
            overruns: 0,
        }
    }

    /// Sleep until the next tick deadline.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.overruns = self.overruns.saturating_add(1);
            warn!(
                "PACER: tick overran by {} ms",
                (now - self.next).as_millis()
            );
            self.next = now + self.period;
        }
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}
