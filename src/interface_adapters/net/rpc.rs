// JSON-RPC transports: unary calls over HTTP, unary plus streaming over WebSocket.

use crate::domain::BroadcastEvent;
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::net::{LoopControl, NetError, send_close_with_reason, send_json};
use crate::interface_adapters::rpc::{
    CANCEL_METHOD, Dispatch, RpcError, RpcNotification, RpcRequest, RpcResponse, dispatch,
    parse_request,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::Subscription;

use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use futures::SinkExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

// Rejects the request unless it carries the configured bearer token.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.rpc_token.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    if presented == Some(expected) {
        return Ok(());
    }

    warn!(has_header = headers.contains_key(AUTHORIZATION), "rpc request unauthorized");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "missing or invalid bearer token".to_string(),
        }),
    )
        .into_response())
}

pub async fn rpc_http_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    // Parsed by hand so malformed bodies still get a JSON-RPC error.
    let response = match parse_request(&body) {
        Ok(request) => match dispatch(&state.hub, request) {
            Dispatch::Reply(response) => response,
            Dispatch::Subscribe(id) => RpcResponse::failure(
                id,
                RpcError::invalid_request("map.events.subscribe requires the /api/rpc/ws transport"),
            ),
            Dispatch::Silent => return StatusCode::NO_CONTENT.into_response(),
        },
        Err(response) => response,
    };
    Json(response).into_response()
}

pub async fn rpc_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    ws.on_upgrade(move |socket| {
        let conn_id = Uuid::new_v4().simple().to_string();
        let span = info_span!("rpc", %conn_id);
        handle_socket(socket, state).instrument(span)
    })
}

struct EventStream {
    // Id of the `map.events.subscribe` request this stream answers.
    request_id: Value,
    events: Subscription<BroadcastEvent>,
    delivered: u64,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    #[serde(default)]
    id: Option<Value>,
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("rpc client connected");
    let mut stream: Option<EventStream> = None;

    if let Err(e) = run_rpc_loop(&mut socket, &state, &mut stream).await {
        warn!(error = ?e, "rpc loop exited with error");
    }
    if let Some(active) = stream.take() {
        debug!(delivered = active.delivered, "event stream dropped with connection");
    }
    if let Err(err) = socket.close().await {
        debug!(error = ?err, "socket close error");
    }
    info!("rpc client disconnected");
}

async fn run_rpc_loop(
    socket: &mut WebSocket,
    state: &AppState,
    stream: &mut Option<EventStream>,
) -> Result<(), NetError> {
    loop {
        let control = tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => handle_frame(socket, state, stream, &text).await?,
                Some(Ok(Message::Binary(_))) => {
                    if let Err(e) = send_close_with_reason(
                        socket,
                        close_code::UNSUPPORTED,
                        "binary messages not supported",
                    )
                    .await
                    {
                        debug!(error = ?e, "close frame send failed");
                    }
                    LoopControl::Disconnect
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => LoopControl::Continue,
                Some(Ok(Message::Close(_))) | None => LoopControl::Disconnect,
                Some(Err(e)) => {
                    debug!(error = ?e, "rpc socket error");
                    LoopControl::Disconnect
                }
            },

            event = next_event(stream) => {
                match event {
                    Some(event) => {
                        send_json(socket, &RpcNotification::event(event.into())).await?;
                        if let Some(active) = stream.as_mut() {
                            active.delivered += 1;
                        }
                    }
                    None => {
                        if let Some(response) = end_evicted_stream(stream) {
                            send_json(socket, &response).await?;
                        }
                    }
                }
                LoopControl::Continue
            }
        };

        if let LoopControl::Disconnect = control {
            return Ok(());
        }
    }
}

// Pending forever while no stream is active.
async fn next_event(stream: &mut Option<EventStream>) -> Option<BroadcastEvent> {
    match stream {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

// The final response to an evicted stream's subscribe request.
fn end_evicted_stream(stream: &mut Option<EventStream>) -> Option<RpcResponse> {
    let ended = stream.take()?;
    warn!(
        subscriber = ended.events.id(),
        delivered = ended.delivered,
        "event stream evicted"
    );
    Some(RpcResponse::failure(
        ended.request_id,
        RpcError::subscription_evicted(),
    ))
}

async fn handle_frame(
    socket: &mut WebSocket,
    state: &AppState,
    stream: &mut Option<EventStream>,
    text: &str,
) -> Result<LoopControl, NetError> {
    let request = match parse_request(text) {
        Ok(request) => request,
        Err(response) => {
            send_json(socket, &response).await?;
            return Ok(LoopControl::Continue);
        }
    };

    if request.method == CANCEL_METHOD {
        cancel_stream(socket, stream, request).await?;
        return Ok(LoopControl::Continue);
    }

    match dispatch(&state.hub, request) {
        Dispatch::Reply(response) => {
            send_json(socket, &response).await?;
        }
        Dispatch::Silent => {}
        Dispatch::Subscribe(id) => {
            if let Some(active) = stream.as_ref() {
                let error = RpcError::invalid_request(format!(
                    "an event stream is already active for request {}",
                    active.request_id
                ));
                send_json(socket, &RpcResponse::failure(id, error)).await?;
            } else {
                let events = state.hub.events.subscribe();
                info!(subscriber = events.id(), request_id = %id, "event stream opened");
                *stream = Some(EventStream {
                    request_id: id,
                    events,
                    delivered: 0,
                });
            }
        }
    }
    Ok(LoopControl::Continue)
}

async fn cancel_stream(
    socket: &mut WebSocket,
    stream: &mut Option<EventStream>,
    request: RpcRequest,
) -> Result<(), NetError> {
    let target = serde_json::from_value::<CancelParams>(request.params)
        .ok()
        .and_then(|params| params.id);

    let matches = match (stream.as_ref(), target.as_ref()) {
        (Some(active), Some(target)) => &active.request_id == target,
        // A bare cancel ends whatever stream is active.
        (Some(_), None) => true,
        (None, _) => false,
    };
    if !matches {
        debug!(?target, "cancel for unknown stream ignored");
        return Ok(());
    }

    if let Some(ended) = stream.take() {
        info!(delivered = ended.delivered, "event stream cancelled");
        send_json(
            socket,
            &RpcResponse::success(ended.request_id, json!({"ok": true})),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LatLng, Marker};
    use crate::use_cases::MapHub;

    fn open_stream(hub: &MapHub, request_id: Value) -> Option<EventStream> {
        Some(EventStream {
            request_id,
            events: hub.events.subscribe(),
            delivered: 0,
        })
    }

    #[tokio::test]
    async fn when_stream_falls_behind_then_subscribe_is_answered_with_eviction() {
        let hub = MapHub::new(1);
        let mut stream = open_stream(&hub, json!(42));

        hub.markers
            .add(Marker::new("a1", "Alpha-01", LatLng::new(30.0, -100.0)));
        // second publish finds the single slot taken
        hub.markers.delete("a1");

        assert!(next_event(&mut stream).await.is_some());
        assert!(next_event(&mut stream).await.is_none());

        let response = end_evicted_stream(&mut stream).expect("evicted stream is answered");
        assert_eq!(response.id, json!(42));
        assert_eq!(
            response.error.map(|e| e.code),
            Some(RpcError::SUBSCRIPTION_EVICTED)
        );
        assert!(stream.is_none());
        assert!(end_evicted_stream(&mut stream).is_none());
    }

    #[tokio::test]
    async fn when_stream_keeps_up_then_events_arrive_in_order() {
        let hub = MapHub::new(4);
        let mut stream = open_stream(&hub, json!(1));

        hub.markers
            .add(Marker::new("a1", "Alpha-01", LatLng::new(30.0, -100.0)));
        hub.markers.delete("a1");

        let kinds: Vec<&str> = [
            next_event(&mut stream).await,
            next_event(&mut stream).await,
        ]
        .into_iter()
        .map(|event| match event {
            Some(BroadcastEvent::MarkerOp(op)) => op.op,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
        assert_eq!(kinds, vec!["add", "delete"]);
        assert!(stream.is_some());
    }
}
