// Network adapters split by browser view sockets vs JSON-RPC transports.

pub mod rpc;
pub mod view;

pub use rpc::{rpc_http_handler, rpc_ws_handler};
pub use view::ws_handler;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::SinkExt;
use serde::Serialize;

#[derive(Debug)]
pub(crate) enum NetError {
    // Categorizes connection failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

pub(crate) enum LoopControl {
    Continue,
    Disconnect,
}

pub(crate) async fn send_json<T: Serialize>(
    socket: &mut WebSocket,
    msg: &T,
) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket.send(Message::Text(txt.into())).await?;
    Ok(bytes)
}

pub(crate) async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await?;
    socket.close().await.map_err(NetError::Ws)
}
