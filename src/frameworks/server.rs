// Framework bootstrap for the map server runtime.

use crate::frameworks::config::{self, ServerSettings};
use crate::interface_adapters::http::health_handler;
use crate::interface_adapters::net::{rpc_http_handler, rpc_ws_handler, ws_handler};
use crate::interface_adapters::rpc::validate_method_table;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{MapHub, MockGenerator, fleet_task};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/rpc", post(rpc_http_handler))
        .route("/api/rpc/ws", get(rpc_ws_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_with_settings(listener, ServerSettings::from_env()).await
}

pub async fn run_with_settings(
    listener: tokio::net::TcpListener,
    settings: ServerSettings,
) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(&settings)?;

    // The central fleet lives as long as the server does.
    let shutdown = Arc::new(Notify::new());
    let fleet = spawn_fleet(&state.hub, &settings, &shutdown);

    let app = router(state);
    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });

    shutdown.notify_one();
    if let Some(handle) = fleet {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "fleet task did not stop cleanly");
        }
    }
    tracing::info!("server stopped");
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::new(config::bind_ip(), config::http_port());

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

pub fn build_state(settings: &ServerSettings) -> Result<Arc<AppState>> {
    // A broken method table is a startup failure, not a per-request one.
    let methods = validate_method_table()
        .map_err(|e| std::io::Error::other(format!("invalid rpc method table: {e}")))?;
    tracing::debug!(methods, "rpc method table validated");

    let hub = Arc::new(MapHub::new(settings.queue_capacity));
    tracing::debug!(
        queue_capacity = settings.queue_capacity,
        tick_interval_ms = settings.sessions.tick_interval.as_millis(),
        connect_grace_ms = settings.sessions.connect_grace.as_millis(),
        source = ?settings.sessions.source,
        rpc_auth = settings.rpc_token.is_some(),
        "map hub configured"
    );

    Ok(Arc::new(AppState {
        hub,
        sessions: settings.sessions.clone(),
        rpc_token: settings.rpc_token.as_deref().map(Arc::from),
    }))
}

fn spawn_fleet(
    hub: &Arc<MapHub>,
    settings: &ServerSettings,
    shutdown: &Arc<Notify>,
) -> Option<JoinHandle<()>> {
    if settings.fleet_size == 0 {
        tracing::info!("central fleet disabled");
        return None;
    }
    Some(tokio::spawn(fleet_task(
        Arc::clone(hub),
        MockGenerator::new(settings.fleet_size),
        settings.fleet_tick_interval,
        Arc::clone(shutdown),
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until the process exits.
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
