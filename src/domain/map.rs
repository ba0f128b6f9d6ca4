// Map-level commands (server -> views) and events (views/API -> subscribers).

use super::geo::LatLng;
use super::marker::MarkerOp;

/// Camera/highlight commands issued by external clients to every view.
#[derive(Debug, Clone, PartialEq)]
pub enum MapCommand {
    SetView { center: LatLng, zoom: f64 },
    FlyTo { center: LatLng, zoom: f64 },
    FitBounds { corner1: LatLng, corner2: LatLng },
    FlyToBounds { corner1: LatLng, corner2: LatLng },
    SetZoom { zoom: f64 },
    ResetView,
    HighlightMarker { id: String },
}

/// Marker CRUD operation performed through the API.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerOpEvent {
    pub op: &'static str,
    pub id: String,
    pub name: Option<String>,
    pub position: Option<LatLng>,
}

impl From<&MarkerOp> for MarkerOpEvent {
    fn from(op: &MarkerOp) -> Self {
        match op {
            MarkerOp::Add { id, name, position } | MarkerOp::Update { id, name, position } => {
                Self {
                    op: op.kind(),
                    id: id.clone(),
                    name: Some(name.clone()),
                    position: Some(*position),
                }
            }
            MarkerOp::Delete { id } => Self {
                op: op.kind(),
                id: id.clone(),
                name: None,
                position: None,
            },
        }
    }
}

/// Browser interaction with a marker (click, drag, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInteraction {
    pub event: String,
    pub id: String,
    pub name: String,
    pub position: LatLng,
}

/// Browser interaction with the map itself (click, zoom, pan, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct MapInteraction {
    pub event: String,
    pub center: LatLng,
    pub zoom: f64,
    pub position: Option<LatLng>,
}

/// Everything published on the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    MarkerOp(MarkerOpEvent),
    Marker(MarkerInteraction),
    Map(MapInteraction),
}
