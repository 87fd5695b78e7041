//! Raw code → millimetre conversion over a piecewise-linear curve.
//!
//! Codes between two points interpolate along that segment; codes beyond
//! the first or last point extrapolate along the nearest end segment. Range
//! rejection is the reader's job, not the curve's.

use crate::config::{CalPoint, Calibration};

impl Calibration {
    /// Convert a (possibly fractional, when oversampled) raw code.
    ///
    /// Requires at least two points with strictly increasing `raw`, which
    /// [`SystemConfig::validate`](crate::config::SystemConfig::validate)
    /// guarantees. Degenerate curves yield `0.0`.
    pub fn to_mm(&self, raw: f32) -> f32 {
        let pts = &self.points;
        if pts.len() < 2 {
            return 0.0;
        }

        // Segment whose upper point is the first one above `raw`, pinned to
        // the end segments for extrapolation.
        let upper = pts
            .iter()
            .position(|p| f32::from(p.raw) > raw)
            .unwrap_or(pts.len() - 1)
            .max(1);
        segment(pts[upper - 1], pts[upper], raw)
    }
}

fn segment(lo: CalPoint, hi: CalPoint, raw: f32) -> f32 {
    let span = f32::from(hi.raw) - f32::from(lo.raw);
    if span <= 0.0 {
        return 0.0;
    }
    let t = (raw - f32::from(lo.raw)) / span;
    lo.level_mm + t * (hi.level_mm - lo.level_mm)
}
