// Wire DTOs and conversions for view sockets and RPC payloads.
// Positions always travel as `[lat, lng]` pairs.

use crate::domain::{
    BroadcastEvent, LatLng, MapCommand, MapInteraction, Marker, MarkerInteraction,
};
use crate::use_cases::ViewDelta;
use serde::{Deserialize, Serialize};

pub type LatLngDto = [f64; 2];

/// Marker as rendered by views and returned by `markers.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDto {
    pub id: String,
    pub name: String,
    #[serde(rename = "latLng")]
    pub lat_lng: LatLngDto,
}

impl From<&Marker> for MarkerDto {
    fn from(marker: &Marker) -> Self {
        Self {
            id: marker.id.clone(),
            name: marker.name.clone(),
            lat_lng: marker.position.to_pair(),
        }
    }
}

/// Messages the server pushes to a view over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ViewMessage {
    // Initial render, sent once right after the socket opens.
    #[serde(rename = "mount")]
    Mount { markers: Vec<MarkerDto> },
    #[serde(rename = "dmarker-add")]
    MarkerAdd(MarkerDto),
    #[serde(rename = "dmarker-update")]
    MarkerUpdate {
        id: String,
        #[serde(rename = "latLng")]
        lat_lng: LatLngDto,
    },
    #[serde(rename = "dmarker-delete")]
    MarkerDelete { id: String },
    #[serde(rename = "map-command")]
    MapCommand(MapCommandDto),
}

impl From<ViewDelta> for ViewMessage {
    fn from(delta: ViewDelta) -> Self {
        match delta {
            ViewDelta::AddMarker { id, name, position } => Self::MarkerAdd(MarkerDto {
                id,
                name,
                lat_lng: position.to_pair(),
            }),
            ViewDelta::MoveMarker { id, position } => Self::MarkerUpdate {
                id,
                lat_lng: position.to_pair(),
            },
            ViewDelta::RemoveMarker { id } => Self::MarkerDelete { id },
            ViewDelta::Command(command) => Self::MapCommand(command.into()),
        }
    }
}

/// Map command as the browser hook consumes it: `{"command": "flyTo", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum MapCommandDto {
    SetView {
        #[serde(rename = "latLng")]
        lat_lng: LatLngDto,
        zoom: f64,
    },
    FlyTo {
        #[serde(rename = "latLng")]
        lat_lng: LatLngDto,
        zoom: f64,
    },
    FitBounds {
        corner1: LatLngDto,
        corner2: LatLngDto,
    },
    FlyToBounds {
        corner1: LatLngDto,
        corner2: LatLngDto,
    },
    SetZoom {
        zoom: f64,
    },
    ResetView,
    HighlightMarker {
        id: String,
    },
}

impl From<MapCommand> for MapCommandDto {
    fn from(command: MapCommand) -> Self {
        match command {
            MapCommand::SetView { center, zoom } => Self::SetView {
                lat_lng: center.to_pair(),
                zoom,
            },
            MapCommand::FlyTo { center, zoom } => Self::FlyTo {
                lat_lng: center.to_pair(),
                zoom,
            },
            MapCommand::FitBounds { corner1, corner2 } => Self::FitBounds {
                corner1: corner1.to_pair(),
                corner2: corner2.to_pair(),
            },
            MapCommand::FlyToBounds { corner1, corner2 } => Self::FlyToBounds {
                corner1: corner1.to_pair(),
                corner2: corner2.to_pair(),
            },
            MapCommand::SetZoom { zoom } => Self::SetZoom { zoom },
            MapCommand::ResetView => Self::ResetView,
            MapCommand::HighlightMarker { id } => Self::HighlightMarker { id },
        }
    }
}

/// Messages a view sends to the server (browser interactions).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ViewClientMessage {
    #[serde(rename = "marker-event")]
    MarkerEvent(MarkerEventDto),
    #[serde(rename = "map-event")]
    MapEvent(MapEventDto),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerEventDto {
    pub event: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "latLng")]
    pub lat_lng: LatLngDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapEventDto {
    pub event: String,
    pub center: LatLngDto,
    pub zoom: f64,
    #[serde(default, rename = "latLng")]
    pub lat_lng: Option<LatLngDto>,
}

impl From<ViewClientMessage> for BroadcastEvent {
    fn from(message: ViewClientMessage) -> Self {
        match message {
            ViewClientMessage::MarkerEvent(dto) => BroadcastEvent::Marker(MarkerInteraction {
                event: dto.event,
                id: dto.id,
                name: dto.name,
                position: LatLng::from_pair(dto.lat_lng),
            }),
            ViewClientMessage::MapEvent(dto) => BroadcastEvent::Map(MapInteraction {
                event: dto.event,
                center: LatLng::from_pair(dto.center),
                zoom: dto.zoom,
                position: dto.lat_lng.map(LatLng::from_pair),
            }),
        }
    }
}

/// Params of a `notifications/map.event` notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventDto {
    #[serde(rename = "marker-op")]
    MarkerOp {
        op: &'static str,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "latLng", skip_serializing_if = "Option::is_none")]
        lat_lng: Option<LatLngDto>,
    },
    #[serde(rename = "marker-event")]
    MarkerEvent {
        event: String,
        id: String,
        name: String,
        #[serde(rename = "latLng")]
        lat_lng: LatLngDto,
    },
    #[serde(rename = "map-event")]
    MapEvent {
        event: String,
        center: LatLngDto,
        zoom: f64,
        #[serde(rename = "latLng")]
        lat_lng: Option<LatLngDto>,
    },
}

impl From<BroadcastEvent> for EventDto {
    fn from(event: BroadcastEvent) -> Self {
        match event {
            BroadcastEvent::MarkerOp(op) => Self::MarkerOp {
                op: op.op,
                id: op.id,
                name: op.name,
                lat_lng: op.position.map(LatLng::to_pair),
            },
            BroadcastEvent::Marker(interaction) => Self::MarkerEvent {
                event: interaction.event,
                id: interaction.id,
                name: interaction.name,
                lat_lng: interaction.position.to_pair(),
            },
            BroadcastEvent::Map(interaction) => Self::MapEvent {
                event: interaction.event,
                center: interaction.center.to_pair(),
                zoom: interaction.zoom,
                lat_lng: interaction.position.map(LatLng::to_pair),
            },
        }
    }
}

// RPC params. Missing fields surface as invalid-params errors.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerParams {
    pub id: String,
    pub name: String,
    pub lat_lng: LatLngDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParams {
    pub lat_lng: LatLngDto,
    pub zoom: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundsParams {
    pub corner1: LatLngDto,
    pub corner2: LatLngDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoomParams {
    pub zoom: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResult {
    pub ok: bool,
}

impl OkResult {
    pub const OK: Self = Self { ok: true };
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerListResult {
    pub markers: Vec<MarkerDto>,
}
