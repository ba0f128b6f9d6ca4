mod support;

use futures::SinkExt;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

async fn send(ws: &mut support::WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("frame should send");
}

// Subscribes and waits until the server has registered the stream.
async fn subscribe(ws: &mut support::WsStream, id: u64) {
    send(ws, json!({"jsonrpc": "2.0", "id": id, "method": "map.events.subscribe"})).await;
    send(ws, json!({"jsonrpc": "2.0", "id": id + 1, "method": "markers.list"})).await;
    support::wait_for(ws, |frame| frame["id"] == id + 1).await;
}

#[tokio::test]
async fn test_marker_ops_stream_until_cancelled() {
    let base_url = support::ensure_server();
    let mut ws = support::connect(&support::ws_url(base_url, "/api/rpc/ws")).await;
    subscribe(&mut ws, 10).await;

    let id = support::unique_id("streamed");
    support::rpc(
        base_url,
        1,
        "markers.add",
        json!({"id": id, "name": "Echo-05", "latLng": [33.0, -97.0]}),
    )
    .await;

    let notification = support::wait_for(&mut ws, |frame| frame["params"]["id"] == id.as_str()).await;
    assert_eq!(notification["jsonrpc"], "2.0");
    assert_eq!(notification["method"], "notifications/map.event");
    assert_eq!(
        notification["params"],
        json!({"type": "marker-op", "op": "add", "id": id, "name": "Echo-05", "latLng": [33.0, -97.0]})
    );

    send(&mut ws, json!({"jsonrpc": "2.0", "method": "$/cancelRequest", "params": {"id": 10}})).await;
    let done = support::wait_for(&mut ws, |frame| frame["id"] == 10).await;
    assert_eq!(done["result"], json!({"ok": true}));
}

#[tokio::test]
async fn test_second_subscribe_on_one_socket_is_rejected() {
    let base_url = support::ensure_server();
    let mut ws = support::connect(&support::ws_url(base_url, "/api/rpc/ws")).await;
    subscribe(&mut ws, 20).await;

    send(&mut ws, json!({"jsonrpc": "2.0", "id": 30, "method": "map.events.subscribe"})).await;
    let rejected = support::wait_for(&mut ws, |frame| frame["id"] == 30).await;
    assert_eq!(rejected["error"]["code"], -32600);
}

#[tokio::test]
async fn test_notifications_get_no_reply_over_the_socket() {
    let base_url = support::ensure_server();
    let mut ws = support::connect(&support::ws_url(base_url, "/api/rpc/ws")).await;
    let id = support::unique_id("silent");

    send(
        &mut ws,
        json!({"jsonrpc": "2.0", "method": "markers.add",
               "params": {"id": id, "name": "Foxtrot-06", "latLng": [36.0, -95.0]}}),
    )
    .await;
    send(&mut ws, json!({"jsonrpc": "2.0", "method": "markers.explode"})).await;
    send(&mut ws, json!({"jsonrpc": "2.0", "id": 61, "method": "markers.list"})).await;

    // frames are handled in order, so the list reply is the first frame back
    let reply = support::next_json(&mut ws).await;
    assert_eq!(reply["id"], 61);
    let markers = reply["result"]["markers"]
        .as_array()
        .expect("list should carry markers");
    assert!(markers.iter().any(|marker| marker["id"] == id.as_str()));
}

#[tokio::test]
async fn test_unary_calls_work_over_the_socket() {
    let base_url = support::ensure_server();
    let mut ws = support::connect(&support::ws_url(base_url, "/api/rpc/ws")).await;

    send(&mut ws, json!({"jsonrpc": "2.0", "id": 50, "method": "map.resetView"})).await;
    let reply = support::next_json(&mut ws).await;
    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 50, "result": {"ok": true}}));

    ws.send(Message::Text("not json".into()))
        .await
        .expect("frame should send");
    let parse_error = support::next_json(&mut ws).await;
    assert_eq!(parse_error["error"]["code"], -32700);
}
