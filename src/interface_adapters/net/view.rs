use crate::interface_adapters::net::{LoopControl, NetError, send_json};
use crate::interface_adapters::protocol::{MarkerDto, ViewClientMessage, ViewMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{CloseReason, MIN_TICK_INTERVAL, SessionPhase, ViewSession};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

const MAX_INVALID_JSON: u32 = 10;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let conn_id = Uuid::new_v4().simple().to_string();
        let span = info_span!("view", %conn_id);
        handle_socket(socket, state).instrument(span)
    })
}

#[derive(Default)]
struct ViewCtx {
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    close_frame: Option<CloseFrame>,
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let source = state.sessions.open_source(&state.hub);
    let mut session = ViewSession::mount(source, &state.hub);
    let mut ctx = ViewCtx::default();

    // Initial render straight from the source snapshot.
    let markers: Vec<MarkerDto> = session
        .initial_markers()
        .iter()
        .map(MarkerDto::from)
        .collect();
    let marker_count = markers.len();
    match send_json(&mut socket, &ViewMessage::Mount { markers }).await {
        Ok(bytes) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += bytes as u64;
        }
        Err(e) => {
            warn!(error = ?e, "failed to send mount frame");
            return;
        }
    }
    info!(markers = marker_count, source = ?state.sessions.source, "view mounted");

    let reason = match run_view_loop(&mut socket, &mut session, &state, &mut ctx).await {
        Ok(reason) => reason,
        Err(e) => {
            warn!(error = ?e, "view loop exited with error");
            CloseReason::Disconnected
        }
    };

    if let Some(frame) = ctx.close_frame.take() {
        let _ = socket.send(Message::Close(Some(frame))).await;
    }
    if let Err(err) = socket.close().await {
        debug!(error = ?err, "socket close error");
    }
    session.close(reason);

    info!(
        ?reason,
        ticks = session.ticks(),
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        "view disconnected"
    );
}

async fn run_view_loop(
    socket: &mut WebSocket,
    session: &mut ViewSession,
    state: &AppState,
    ctx: &mut ViewCtx,
) -> Result<CloseReason, NetError> {
    // Browser hooks attach during the grace period; interactions are still forwarded.
    if let LoopControl::Disconnect =
        wait_connect_grace(socket, session, ctx, state.sessions.connect_grace).await
    {
        return Ok(CloseReason::Disconnected);
    }
    session.connect();
    debug!("view connected");

    let tick_interval = state.sessions.tick_interval.max(MIN_TICK_INTERVAL);
    let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let control = tokio::select! {
            incoming = socket.recv() => handle_incoming(incoming, session, ctx),

            _ = ticker.tick() => {
                for delta in session.tick() {
                    let bytes = send_json(socket, &ViewMessage::from(delta)).await?;
                    ctx.msgs_out += 1;
                    ctx.bytes_out += bytes as u64;
                }
                if session.phase() == SessionPhase::Closed {
                    warn!(ticks = session.ticks(), "view fell behind; closing");
                    ctx.close_frame = Some(CloseFrame {
                        code: close_code::POLICY,
                        reason: "too slow".into(),
                    });
                    return Ok(CloseReason::Evicted);
                }
                LoopControl::Continue
            }
        };

        if let LoopControl::Disconnect = control {
            return Ok(CloseReason::Disconnected);
        }
    }
}

// Takes `&mut` so the future stays `Send`; sources are not `Sync`.
async fn wait_connect_grace(
    socket: &mut WebSocket,
    session: &mut ViewSession,
    ctx: &mut ViewCtx,
    grace: Duration,
) -> LoopControl {
    let grace = sleep(grace);
    tokio::pin!(grace);

    loop {
        tokio::select! {
            _ = &mut grace => return LoopControl::Continue,
            incoming = socket.recv() => {
                if let LoopControl::Disconnect = handle_incoming(incoming, session, ctx) {
                    return LoopControl::Disconnect;
                }
            }
        }
    }
}

fn handle_incoming(
    incoming: Option<Result<Message, Error>>,
    session: &ViewSession,
    ctx: &mut ViewCtx,
) -> LoopControl {
    let msg = match incoming {
        Some(Ok(msg)) => msg,
        Some(Err(e)) => {
            debug!(error = ?e, "view socket error");
            return LoopControl::Disconnect;
        }
        None => return LoopControl::Disconnect,
    };

    match msg {
        Message::Text(text) => {
            ctx.msgs_in += 1;
            ctx.bytes_in += text.len() as u64;

            match serde_json::from_str::<ViewClientMessage>(&text) {
                Ok(message) => {
                    let report = session.forward(message.into());
                    debug!(
                        delivered = report.delivered,
                        evicted = report.evicted,
                        "browser event forwarded"
                    );
                    LoopControl::Continue
                }
                Err(e) => {
                    ctx.invalid_json += 1;
                    debug!(error = %e, count = ctx.invalid_json, "invalid view frame");
                    if ctx.invalid_json > MAX_INVALID_JSON {
                        warn!("too many invalid frames; disconnecting");
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "invalid payloads".into(),
                        });
                        LoopControl::Disconnect
                    } else {
                        LoopControl::Continue
                    }
                }
            }
        }
        Message::Binary(_) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            LoopControl::Disconnect
        }
        Message::Ping(_) | Message::Pong(_) => LoopControl::Continue,
        Message::Close(_) => LoopControl::Disconnect,
    }
}
