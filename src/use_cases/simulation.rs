// Simulated fleet: a self-contained marker generator and the central task that
// drives the shared registry from one.

use crate::domain::systems::motion::advance;
use crate::domain::tuning::motion::MotionTuning;
use crate::domain::{LatLng, Marker, MarkerOp, Motion};
use crate::use_cases::hub::MapHub;
use crate::use_cases::session::MIN_TICK_INTERVAL;
use crate::use_cases::source::MarkerSource;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

const CALLSIGNS: [&str; 15] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliet",
    "Kilo", "Lima", "Mike", "November", "Oscar",
];

pub const MIN_MARKERS: usize = 2;
pub const MAX_MARKERS: usize = 120;

// Relative weights of the op picked on each poll.
const MOVE_WEIGHT: u32 = 6;
const ADD_WEIGHT: u32 = 2;
const DELETE_WEIGHT: u32 = 1;

/// Owns a private set of moving markers and emits one op per poll.
pub struct MockGenerator {
    // Ordered so seeded runs pick the same markers.
    markers: BTreeMap<String, Marker>,
    used_names: HashSet<String>,
    counter: u32,
    tuning: MotionTuning,
    rng: StdRng,
}

impl MockGenerator {
    pub fn new(initial_count: usize) -> Self {
        Self::with_rng(initial_count, MotionTuning::default(), StdRng::from_entropy())
    }

    /// Deterministic construction for tests and reproducible demos.
    pub fn with_rng(initial_count: usize, tuning: MotionTuning, rng: StdRng) -> Self {
        let mut generator = Self {
            markers: BTreeMap::new(),
            used_names: HashSet::new(),
            counter: 0,
            tuning,
            rng,
        };
        for _ in 0..initial_count {
            generator.spawn_marker();
        }
        generator
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Picks and applies one op: move (6), add (2) below the cap, delete (1)
    /// above the floor.
    pub fn next_op(&mut self) -> MarkerOp {
        let count = self.markers.len();
        let add_weight = if count < MAX_MARKERS { ADD_WEIGHT } else { 0 };
        let delete_weight = if count > MIN_MARKERS { DELETE_WEIGHT } else { 0 };
        // Nothing to move yet: fall through to add.
        let move_weight = if count > 0 { MOVE_WEIGHT } else { 0 };

        // `add` is always possible while empty and `move` while at the cap.
        let roll = self
            .rng
            .gen_range(0..move_weight + add_weight + delete_weight);

        if roll < move_weight {
            if let Some(op) = self.move_random_marker() {
                return op;
            }
        }
        if roll < move_weight + add_weight {
            return MarkerOp::added(&self.spawn_marker());
        }
        match self.delete_random_marker() {
            Some(op) => op,
            None => MarkerOp::added(&self.spawn_marker()),
        }
    }

    fn move_random_marker(&mut self) -> Option<MarkerOp> {
        let id = self.markers.keys().choose(&mut self.rng)?.clone();
        let marker = self.markers.get_mut(&id)?;
        advance(marker, &self.tuning, &mut self.rng)?;
        Some(MarkerOp::updated(marker))
    }

    /// Stops simulating `id`; later ops never mention it again.
    pub fn forget(&mut self, id: &str) -> bool {
        self.markers.remove(id).is_some()
    }

    fn delete_random_marker(&mut self) -> Option<MarkerOp> {
        let id = self.markers.keys().choose(&mut self.rng)?.clone();
        self.markers.remove(&id)?;
        Some(MarkerOp::Delete { id })
    }

    fn spawn_marker(&mut self) -> Marker {
        self.counter += 1;
        let name = self.unused_name();
        self.used_names.insert(name.clone());

        // 8 hex chars taken from a v4 uuid built off the seeded rng
        let id = uuid::Builder::from_random_bytes(self.rng.r#gen::<[u8; 16]>())
            .into_uuid()
            .simple()
            .to_string()[..8]
            .to_string();
        let bounds = self.tuning.bounds;
        let (speed_lo, speed_hi) = self.tuning.speed_range;
        let position = LatLng::new(
            self.rng.gen_range(bounds.min_lat..=bounds.max_lat),
            self.rng.gen_range(bounds.min_lng..=bounds.max_lng),
        )
        .rounded();
        let motion = Motion {
            heading: self.rng.gen_range(0.0..360.0),
            speed: self.rng.gen_range(speed_lo..=speed_hi),
        };

        let marker = Marker::new(id, name, position).with_motion(motion);
        self.markers.insert(marker.id.clone(), marker.clone());
        marker
    }

    fn unused_name(&self) -> String {
        CALLSIGNS
            .iter()
            .map(|callsign| format!("{callsign}-{:02}", self.counter))
            .find(|candidate| !self.used_names.contains(candidate))
            .unwrap_or_else(|| format!("Unit-{:02}", self.counter))
    }
}

impl MarkerSource for MockGenerator {
    fn snapshot(&self) -> Vec<Marker> {
        self.markers.values().cloned().collect()
    }

    fn poll(&mut self) -> Option<MarkerOp> {
        Some(self.next_op())
    }
}

/// Drives the shared registry from a generator until `shutdown` fires.
///
/// The generator's initial markers are seeded into the registry first, then
/// one op is applied per tick. A simulated id that RPC deletes or replaces
/// leaves the fleet: the registry entry is never moved or removed by it again.
pub async fn fleet_task(
    hub: Arc<MapHub>,
    mut generator: MockGenerator,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) {
    for marker in generator.snapshot() {
        hub.markers.add(marker);
    }
    info!(markers = generator.len(), "fleet simulation started");

    let mut interval = tokio::time::interval(tick_interval.max(MIN_TICK_INTERVAL));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = interval.tick() => {}
        }

        let op = generator.next_op();
        apply_to_registry(&hub, &mut generator, op);
    }

    info!("fleet simulation stopped");
}

// Moves and deletes only touch registry entries that still carry motion,
// i.e. markers this fleet put there and nobody replaced since.
fn apply_to_registry(hub: &MapHub, generator: &mut MockGenerator, op: MarkerOp) {
    let applied = match &op {
        MarkerOp::Add { id, .. } => generator
            .markers
            .get(id)
            .cloned()
            .map(|marker| hub.markers.add(marker)),
        MarkerOp::Update { id, position, .. } => hub.markers.update_moving(id, *position),
        MarkerOp::Delete { id } => hub.markers.delete_moving(id),
    };
    if applied.is_none() {
        debug!(op = op.kind(), id = op.id(), "stale fleet op ignored");
        if generator.forget(op.id()) {
            debug!(id = op.id(), "marker left the fleet");
        }
    }
}
