// Tracked map entities and the CRUD ops broadcast for them.

use super::geo::LatLng;

/// Motion parameters carried only by simulated markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Degrees in [0, 360), 0 = north, 90 = east.
    pub heading: f64,
    /// Degrees of arc per tick before jitter.
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub name: String,
    pub position: LatLng,
    // None for markers pushed over RPC; they only move on explicit updates.
    pub motion: Option<Motion>,
}

impl Marker {
    /// Builds a static marker (no motion), the shape RPC-created markers take.
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            motion: None,
        }
    }

    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = Some(motion);
        self
    }
}

/// A single marker mutation as seen by every view.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Add {
        id: String,
        name: String,
        position: LatLng,
    },
    Update {
        id: String,
        name: String,
        position: LatLng,
    },
    Delete {
        id: String,
    },
}

impl MarkerOp {
    pub fn added(marker: &Marker) -> Self {
        Self::Add {
            id: marker.id.clone(),
            name: marker.name.clone(),
            position: marker.position,
        }
    }

    pub fn updated(marker: &Marker) -> Self {
        Self::Update {
            id: marker.id.clone(),
            name: marker.name.clone(),
            position: marker.position,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Add { id, .. } | Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }

    /// Lowercase op name used on the wire ("add" | "update" | "delete").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}
