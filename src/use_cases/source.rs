// Where a view session gets its markers from.

use crate::domain::{Marker, MarkerOp};
use crate::use_cases::fanout::Subscription;
use crate::use_cases::hub::MapHub;
use std::sync::Arc;

/// Anything that can render an initial marker list and then feed marker ops.
pub trait MarkerSource: Send {
    /// Current markers, used for the initial render.
    fn snapshot(&self) -> Vec<Marker>;

    /// Next pending op, if any. Never waits.
    fn poll(&mut self) -> Option<MarkerOp>;

    /// True once the source can never produce another op (e.g. evicted).
    fn is_closed(&self) -> bool {
        false
    }
}

/// Feed backed by the shared registry: every view sees every API op.
pub struct ApiMarkerSource {
    hub: Arc<MapHub>,
    ops: Subscription<MarkerOp>,
}

impl ApiMarkerSource {
    pub fn attach(hub: Arc<MapHub>) -> Self {
        // Subscribe before the initial render reads the registry so nothing is
        // missed; an op that is also in the snapshot replays idempotently.
        let ops = hub.markers.subscribe();
        Self { hub, ops }
    }

    pub fn subscription_id(&self) -> u64 {
        self.ops.id()
    }
}

impl MarkerSource for ApiMarkerSource {
    fn snapshot(&self) -> Vec<Marker> {
        self.hub.markers.list()
    }

    fn poll(&mut self) -> Option<MarkerOp> {
        self.ops.try_next()
    }

    fn is_closed(&self) -> bool {
        self.ops.is_evicted()
    }
}
