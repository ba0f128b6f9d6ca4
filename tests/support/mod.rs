// Shared primitives for one-time server bootstrapping across integration tests.
#![allow(dead_code)]

use dmap_server::ServerSettings;
use dmap_server::use_cases::{SessionSettings, SourceKind};
use futures::StreamExt;
use serde_json::{Value, json};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// Global base URL used by all tests after the server publishes its bound address.
static SERVER_URL: OnceLock<String> = OnceLock::new();

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

// Fast ticks and no central fleet so the registry only holds what tests add.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        sessions: SessionSettings {
            connect_grace: Duration::from_millis(20),
            tick_interval: Duration::from_millis(40),
            source: SourceKind::Api,
            mock_initial_markers: 5,
        },
        fleet_size: 0,
        ..ServerSettings::default()
    }
}

// Ensure the shared test server is running and return its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_URL
        .get_or_init(|| spawn_server(test_settings()))
        .as_str()
}

// Start a dedicated server with its own hub and return its base URL once it accepts.
pub fn spawn_server(settings: ServerSettings) -> String {
    let published_url = Arc::new(OnceLock::<String>::new());
    let published_url_thread = Arc::clone(&published_url);
    // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("test runtime");
        runtime.block_on(async move {
            // Bind to an ephemeral port to avoid collisions with local services.
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind ephemeral test port");
            let addr = listener.local_addr().expect("get local addr");
            let _ = published_url_thread.set(format!("http://{}", addr));
            dmap_server::run_with_settings(listener, settings)
                .await
                .expect("server failed");
        });
    });
    wait_for_server_url_and_readiness(published_url)
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) -> String {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return base_url;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

pub fn ws_url(base_url: &str, path: &str) -> String {
    let host = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    format!("ws://{host}{path}")
}

pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

// One JSON-RPC call over `POST /api/rpc`; returns the whole response envelope.
pub async fn rpc(base_url: &str, id: u64, method: &str, params: Value) -> Value {
    reqwest::Client::new()
        .post(format!("{base_url}/api/rpc"))
        .json(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
        .send()
        .await
        .expect("rpc request should succeed")
        .json()
        .await
        .expect("rpc response should be json")
}

pub async fn connect(url: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket should connect");
    ws
}

// Next text frame parsed as JSON; other frame kinds are skipped.
pub async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("frame should be json");
        }
    }
}

// Next close frame, skipping text and control frames queued ahead of it.
pub async fn next_close(ws: &mut WsStream) -> Option<CloseFrame> {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a close frame")?;
        match frame {
            Ok(Message::Close(close)) => return close,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

// Reads frames until one matches; frames for other tests sharing the server are skipped.
pub async fn wait_for(ws: &mut WsStream, matches: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = next_json(ws).await;
        if matches(&frame) {
            return frame;
        }
    }
}
