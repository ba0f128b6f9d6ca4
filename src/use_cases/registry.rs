// Authoritative marker state shared by every view and the RPC surface.

use crate::domain::{BroadcastEvent, LatLng, Marker, MarkerOp, MarkerOpEvent};
use crate::use_cases::fanout::{FanOut, Subscription};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Marker id -> marker, plus the channels every committed change is published on.
#[derive(Debug)]
pub struct MarkerRegistry {
    markers: Mutex<HashMap<String, Marker>>,
    ops: FanOut<MarkerOp>,
    // Event-stream mirror of `ops`, shared with the hub.
    events: FanOut<BroadcastEvent>,
}

impl MarkerRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_events(queue_capacity, FanOut::new("map-events", queue_capacity))
    }

    /// Registry that also mirrors each committed op onto `events`.
    pub fn with_events(queue_capacity: usize, events: FanOut<BroadcastEvent>) -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            ops: FanOut::new("marker-ops", queue_capacity),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Marker>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Callers hold the marker lock, so both channels see ops in commit order.
    fn publish(&self, op: &MarkerOp) {
        self.events
            .publish(BroadcastEvent::MarkerOp(MarkerOpEvent::from(op)));
        self.ops.publish(op.clone());
    }

    /// Inserts or replaces the marker with the same id (motion included).
    pub fn add(&self, marker: Marker) -> MarkerOp {
        let op = MarkerOp::added(&marker);
        let mut markers = self.lock();
        let replaced = markers.insert(marker.id.clone(), marker).is_some();
        self.publish(&op);
        debug!(id = op.id(), replaced, "marker added");
        op
    }

    /// Moves a known marker; the stored name is kept. Unknown ids are ignored.
    pub fn update(&self, id: &str, position: LatLng) -> Option<MarkerOp> {
        self.update_where(id, position, |_| true)
    }

    /// Like `update`, but only while the stored marker still has motion.
    ///
    /// A marker replaced through `add` loses its motion and is skipped.
    pub fn update_moving(&self, id: &str, position: LatLng) -> Option<MarkerOp> {
        self.update_where(id, position, |marker| marker.motion.is_some())
    }

    fn update_where(
        &self,
        id: &str,
        position: LatLng,
        applies: impl Fn(&Marker) -> bool,
    ) -> Option<MarkerOp> {
        let mut markers = self.lock();
        let marker = markers.get_mut(id).filter(|marker| applies(marker))?;
        marker.position = position;
        let op = MarkerOp::updated(marker);
        self.publish(&op);
        Some(op)
    }

    /// Removes a marker. Unknown ids are ignored and nothing is published.
    pub fn delete(&self, id: &str) -> Option<MarkerOp> {
        self.delete_where(id, |_| true)
    }

    /// Like `delete`, but only while the stored marker still has motion.
    pub fn delete_moving(&self, id: &str) -> Option<MarkerOp> {
        self.delete_where(id, |marker| marker.motion.is_some())
    }

    fn delete_where(&self, id: &str, applies: impl Fn(&Marker) -> bool) -> Option<MarkerOp> {
        let mut markers = self.lock();
        if !markers.get(id).is_some_and(applies) {
            return None;
        }
        let removed = markers.remove(id)?;
        let op = MarkerOp::Delete { id: removed.id };
        self.publish(&op);
        debug!(id, "marker deleted");
        Some(op)
    }

    /// Copy of the current markers; order is not meaningful.
    pub fn list(&self) -> Vec<Marker> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Marker> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn subscribe(&self) -> Subscription<MarkerOp> {
        self.ops.subscribe()
    }

    pub fn ops(&self) -> &FanOut<MarkerOp> {
        &self.ops
    }
}
