// Domain layer: map entities, wire-independent ops and the motion rules.

pub mod geo;
pub mod map;
pub mod marker;
pub mod systems;
pub mod tuning;

pub use geo::{Bounds, LatLng, US_BOUNDS};
pub use map::{BroadcastEvent, MapCommand, MapInteraction, MarkerInteraction, MarkerOpEvent};
pub use marker::{Marker, MarkerOp, Motion};
