use crate::domain::geo::{Bounds, US_BOUNDS};

#[derive(Debug, Clone, Copy)]
pub struct MotionTuning {
    // Area markers bounce inside.
    pub bounds: Bounds,
    // Per-axis step length multiplier range (inclusive).
    pub step_jitter: (f64, f64),
    // Heading drift per tick, degrees (inclusive, symmetric).
    pub heading_drift: f64,
    // Speed range for newly spawned markers.
    pub speed_range: (f64, f64),
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            bounds: US_BOUNDS,
            step_jitter: (0.6, 1.4),
            heading_drift: 20.0,
            speed_range: (0.4, 1.2),
        }
    }
}
