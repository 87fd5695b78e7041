//! Debounced hysteresis threshold detector.
//!
//! ```text
//!            sample >= rising (hold+1 == min_hold)
//!   ARMED{hold} ───────────────────────────────▶ DISARMED
//!        ▲     sample < rising → hold = 0            │
//!        └────────────── sample <= falling ──────────┘
//! ```
//!
//! Hysteresis plus a minimum hold time rejects sensor chatter and wave
//! action without heavy filtering. A sensor fault freezes the detector: the
//! hold counter does not advance and a disarmed detector does not re-arm.

use log::debug;

use crate::clock::Tick;
use crate::config::Threshold;
use crate::error::SensorFault;
use crate::sensors::SensorSample;

/// The level held above the rising threshold long enough.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingEvent {
    pub timestamp: Tick,
    pub triggering_level: f32,
}

/// Discrete outputs of [`ThresholdDetector::feed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorEvent {
    Crossing(CrossingEvent),
    /// Level fell to the falling threshold; the detector is armed again.
    Rearmed(Tick),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Armed { hold: u32 },
    Disarmed,
}

pub struct ThresholdDetector {
    threshold: Threshold,
    state: DetectorState,
}

impl ThresholdDetector {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            state: DetectorState::Armed { hold: 0 },
        }
    }

    /// Consume one tick's reading outcome.
    pub fn feed(&mut self, reading: Result<&SensorSample, &SensorFault>) -> Option<DetectorEvent> {
        let Ok(sample) = reading else {
            return None;
        };
        let level = sample.level_mm;

        match self.state {
            DetectorState::Armed { hold } => {
                if level < self.threshold.rising_mm {
                    self.state = DetectorState::Armed { hold: 0 };
                    return None;
                }
                let hold = hold + 1;
                if hold >= self.threshold.min_hold_ticks {
                    debug!(
                        "DETECT: crossing at {:.1} mm after {} ticks",
                        level, hold
                    );
                    self.state = DetectorState::Disarmed;
                    Some(DetectorEvent::Crossing(CrossingEvent {
                        timestamp: sample.timestamp,
                        triggering_level: level,
                    }))
                } else {
                    self.state = DetectorState::Armed { hold };
                    None
                }
            }
            DetectorState::Disarmed => {
                if level <= self.threshold.falling_mm {
                    debug!("DETECT: re-armed at {:.1} mm", level);
                    self.state = DetectorState::Armed { hold: 0 };
                    Some(DetectorEvent::Rearmed(sample.timestamp))
                } else {
                    None
                }
            }
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DetectorState::Armed { .. })
    }
}
