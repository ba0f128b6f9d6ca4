use crate::domain::geo::LatLng;
use crate::domain::marker::Marker;
use crate::domain::tuning::motion::MotionTuning;
use rand::Rng;

/// Advances a simulated marker by one tick and returns its new position.
///
/// Displacement is computed from the heading the marker had when the tick
/// started; the random drift is applied afterwards and any boundary
/// reflection acts on the drifted heading. Random draws happen in the order
/// lat jitter, lng jitter, heading drift.
///
/// Markers without motion parameters are left untouched and yield `None`.
pub fn advance<R: Rng + ?Sized>(
    marker: &mut Marker,
    tuning: &MotionTuning,
    rng: &mut R,
) -> Option<LatLng> {
    let motion = marker.motion.as_mut()?;
    let bounds = tuning.bounds;
    let (jitter_lo, jitter_hi) = tuning.step_jitter;

    // direction (0 deg = north / +lat, 90 deg = east / +lng)
    let angle = motion.heading.to_radians();
    let dlat = motion.speed * angle.cos() * rng.gen_range(jitter_lo..=jitter_hi);
    let dlng = motion.speed * angle.sin() * rng.gen_range(jitter_lo..=jitter_hi);

    // gradual drift, every tick regardless of bounces
    let drift = rng.gen_range(-tuning.heading_drift..=tuning.heading_drift);
    motion.heading = wrap_degrees(motion.heading + drift);

    let mut lat = marker.position.lat + dlat;
    let mut lng = marker.position.lng + dlng;

    // bounce; both axes may fire in the same tick and compose
    if !bounds.contains_lat(lat) {
        motion.heading = wrap_degrees(180.0 - motion.heading);
        lat = bounds.clamp_lat(lat);
    }
    if !bounds.contains_lng(lng) {
        motion.heading = wrap_degrees(360.0 - motion.heading);
        lng = bounds.clamp_lng(lng);
    }

    marker.position = LatLng::new(lat, lng).rounded();
    Some(marker.position)
}

/// Wraps any angle into [0, 360).
pub fn wrap_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
