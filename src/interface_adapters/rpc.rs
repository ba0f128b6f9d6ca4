// JSON-RPC 2.0 envelope and the method table shared by both RPC transports.

use crate::domain::{LatLng, MapCommand, Marker};
use crate::interface_adapters::protocol::{
    BoundsParams, EventDto, MarkerDto, MarkerIdParams, MarkerListResult, MarkerParams, OkResult,
    ViewParams, ZoomParams,
};
use crate::use_cases::MapHub;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

pub const JSONRPC_VERSION: &str = "2.0";
/// Ends the caller's active event stream.
pub const CANCEL_METHOD: &str = "$/cancelRequest";
/// Method of the notifications carried on an event stream.
pub const EVENT_NOTIFICATION: &str = "notifications/map.event";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SUBSCRIPTION_EVICTED: i64 = -32000;

    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }

    pub fn subscription_evicted() -> Self {
        Self::new(
            Self::SUBSCRIPTION_EVICTED,
            "event subscription evicted: queue full",
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    // `None` only when the member is absent (a notification); `"id": null` is `Some`.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RpcRequest {
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Requests without an id are never answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: EventDto,
}

impl RpcNotification {
    pub fn event(params: EventDto) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: EVENT_NOTIFICATION,
            params,
        }
    }
}

type UnaryHandler = fn(&MapHub, Value) -> Result<Value, RpcError>;

/// How a method is served.
#[derive(Clone, Copy)]
pub enum Handler {
    /// One request, one response.
    Unary(UnaryHandler),
    /// Long-lived notification stream; only the WebSocket transport serves it.
    EventStream,
}

pub struct MethodEntry {
    pub name: &'static str,
    pub handler: Handler,
}

pub static METHODS: &[MethodEntry] = &[
    MethodEntry {
        name: "markers.add",
        handler: Handler::Unary(markers_add),
    },
    MethodEntry {
        name: "markers.update",
        handler: Handler::Unary(markers_update),
    },
    MethodEntry {
        name: "markers.delete",
        handler: Handler::Unary(markers_delete),
    },
    MethodEntry {
        name: "markers.list",
        handler: Handler::Unary(markers_list),
    },
    MethodEntry {
        name: "map.setView",
        handler: Handler::Unary(map_set_view),
    },
    MethodEntry {
        name: "map.flyTo",
        handler: Handler::Unary(map_fly_to),
    },
    MethodEntry {
        name: "map.fitBounds",
        handler: Handler::Unary(map_fit_bounds),
    },
    MethodEntry {
        name: "map.flyToBounds",
        handler: Handler::Unary(map_fly_to_bounds),
    },
    MethodEntry {
        name: "map.setZoom",
        handler: Handler::Unary(map_set_zoom),
    },
    MethodEntry {
        name: "map.resetView",
        handler: Handler::Unary(map_reset_view),
    },
    MethodEntry {
        name: "map.highlightMarker",
        handler: Handler::Unary(map_highlight_marker),
    },
    MethodEntry {
        name: "map.events.subscribe",
        handler: Handler::EventStream,
    },
];

pub fn lookup(method: &str) -> Option<Handler> {
    METHODS
        .iter()
        .find(|entry| entry.name == method)
        .map(|entry| entry.handler)
}

/// Checked once at startup; returns the number of registered methods.
pub fn validate_method_table() -> Result<usize, String> {
    let mut seen = HashSet::new();
    for entry in METHODS {
        if entry.name.is_empty() || entry.name.starts_with("$/") {
            return Err(format!("reserved method name: {:?}", entry.name));
        }
        if !seen.insert(entry.name) {
            return Err(format!("duplicate method: {}", entry.name));
        }
    }
    Ok(seen.len())
}

/// What the transport has to do with a request.
#[derive(Debug)]
pub enum Dispatch {
    Reply(RpcResponse),
    /// Start an event stream answering to this request id.
    Subscribe(Value),
    /// The request was a notification; nothing goes back.
    Silent,
}

/// Parses one request frame. Errors come back as ready-to-send responses.
pub fn parse_request(text: &str) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| RpcResponse::failure(Value::Null, RpcError::parse_error(e.to_string())))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if !value.is_object() {
        return Err(RpcResponse::failure(
            id,
            RpcError::invalid_request("request must be a JSON object"),
        ));
    }

    let request: RpcRequest = serde_json::from_value(value)
        .map_err(|e| RpcResponse::failure(id.clone(), RpcError::invalid_request(e.to_string())))?;
    match request.jsonrpc.as_deref() {
        Some(version) if version != JSONRPC_VERSION => Err(RpcResponse::failure(
            id,
            RpcError::invalid_request(format!("unsupported jsonrpc version: {version}")),
        )),
        _ => Ok(request),
    }
}

/// Runs unary methods against the hub; streaming is left to the transport.
///
/// Notifications still run but get no reply. A subscribe without an id has
/// nothing to answer its stream to and is dropped.
pub fn dispatch(hub: &MapHub, request: RpcRequest) -> Dispatch {
    let id = request.response_id();
    let notification = request.is_notification();
    let Some(handler) = lookup(&request.method) else {
        debug!(method = %request.method, notification, "unknown rpc method");
        if notification {
            return Dispatch::Silent;
        }
        return Dispatch::Reply(RpcResponse::failure(
            id,
            RpcError::method_not_found(&request.method),
        ));
    };

    let reply = match handler {
        Handler::EventStream if notification => {
            debug!(method = %request.method, "subscribe without id ignored");
            return Dispatch::Silent;
        }
        Handler::EventStream => return Dispatch::Subscribe(id),
        Handler::Unary(call) => match call(hub, request.params) {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %request.method, code = error.code, "rpc call failed");
                RpcResponse::failure(id, error)
            }
        },
    };
    if notification {
        Dispatch::Silent
    } else {
        Dispatch::Reply(reply)
    }
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    // Omitted params behave like an empty object so missing fields are reported by name.
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn ok() -> Result<Value, RpcError> {
    to_result(&OkResult::OK)
}

fn to_result<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| RpcError::internal(e.to_string()))
}

fn markers_add(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let MarkerParams { id, name, lat_lng } = params(raw)?;
    hub.markers
        .add(Marker::new(id, name, LatLng::from_pair(lat_lng)));
    ok()
}

fn markers_update(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    // The name is required on the wire but the stored name is kept.
    let MarkerParams { id, lat_lng, .. } = params(raw)?;
    hub.markers.update(&id, LatLng::from_pair(lat_lng));
    ok()
}

fn markers_delete(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let MarkerIdParams { id } = params(raw)?;
    hub.markers.delete(&id);
    ok()
}

fn markers_list(hub: &MapHub, _raw: Value) -> Result<Value, RpcError> {
    let mut markers: Vec<MarkerDto> = hub.markers.list().iter().map(MarkerDto::from).collect();
    markers.sort_by(|a, b| a.id.cmp(&b.id));
    to_result(&MarkerListResult { markers })
}

fn map_set_view(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let ViewParams { lat_lng, zoom } = params(raw)?;
    hub.issue_command(MapCommand::SetView {
        center: LatLng::from_pair(lat_lng),
        zoom,
    });
    ok()
}

fn map_fly_to(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let ViewParams { lat_lng, zoom } = params(raw)?;
    hub.issue_command(MapCommand::FlyTo {
        center: LatLng::from_pair(lat_lng),
        zoom,
    });
    ok()
}

fn map_fit_bounds(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let BoundsParams { corner1, corner2 } = params(raw)?;
    hub.issue_command(MapCommand::FitBounds {
        corner1: LatLng::from_pair(corner1),
        corner2: LatLng::from_pair(corner2),
    });
    ok()
}

fn map_fly_to_bounds(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let BoundsParams { corner1, corner2 } = params(raw)?;
    hub.issue_command(MapCommand::FlyToBounds {
        corner1: LatLng::from_pair(corner1),
        corner2: LatLng::from_pair(corner2),
    });
    ok()
}

fn map_set_zoom(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let ZoomParams { zoom } = params(raw)?;
    hub.issue_command(MapCommand::SetZoom { zoom });
    ok()
}

fn map_reset_view(hub: &MapHub, _raw: Value) -> Result<Value, RpcError> {
    hub.issue_command(MapCommand::ResetView);
    ok()
}

fn map_highlight_marker(hub: &MapHub, raw: Value) -> Result<Value, RpcError> {
    let MarkerIdParams { id } = params(raw)?;
    hub.issue_command(MapCommand::HighlightMarker { id });
    ok()
}
