use crate::use_cases::fanout::MAX_CAPACITY;
use crate::use_cases::{SessionSettings, SourceKind};
use std::{env, net::IpAddr, str::FromStr, time::Duration};
use tracing::warn;

// Runtime/server settings (not motion tuning).

pub const DEFAULT_HTTP_PORT: u16 = 8123;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1200);
pub const DEFAULT_CONNECT_GRACE: Duration = Duration::from_millis(300);
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MOCK_INITIAL_MARKERS: usize = 5;
pub const DEFAULT_FLEET_SIZE: usize = 5;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(key, env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparsable setting; using default");
            default
        }),
        None => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    millis_or(key, env::var(key).ok().as_deref(), default)
}

fn millis_or(key: &str, raw: Option<&str>, default: Duration) -> Duration {
    Duration::from_millis(parse_or(key, raw, default.as_millis() as u64))
}

// Periods feed `tokio::time::interval`, which rejects zero.
fn period_or(key: &str, raw: Option<&str>, default: Duration) -> Duration {
    let period = millis_or(key, raw, default);
    if period.is_zero() {
        warn!(key, "zero period; using default");
        return default;
    }
    period
}

fn capacity_or(key: &str, raw: Option<&str>, default: usize) -> usize {
    let requested = parse_or(key, raw, default);
    let capacity = requested.clamp(1, MAX_CAPACITY);
    if capacity != requested {
        warn!(key, requested, capacity, "queue capacity out of range; clamped");
    }
    capacity
}

pub fn http_port() -> u16 {
    env_or("DMAP_PORT", DEFAULT_HTTP_PORT)
}

pub fn bind_ip() -> IpAddr {
    env_or("DMAP_BIND", IpAddr::from([127, 0, 0, 1]))
}

pub fn tick_interval() -> Duration {
    let key = "TICK_INTERVAL_MS";
    period_or(key, env::var(key).ok().as_deref(), DEFAULT_TICK_INTERVAL)
}

pub fn connect_grace() -> Duration {
    env_millis("VIEW_CONNECT_GRACE_MS", DEFAULT_CONNECT_GRACE)
}

pub fn subscriber_queue_capacity() -> usize {
    let key = "SUBSCRIBER_QUEUE_CAPACITY";
    capacity_or(key, env::var(key).ok().as_deref(), DEFAULT_QUEUE_CAPACITY)
}

pub fn marker_source() -> SourceKind {
    match env::var("MARKER_SOURCE").as_deref().map(str::trim) {
        Ok("mock") => SourceKind::Mock,
        Ok("api") | Err(_) => SourceKind::Api,
        Ok(other) => {
            warn!(value = other, "unknown MARKER_SOURCE; using api");
            SourceKind::Api
        }
    }
}

pub fn mock_initial_markers() -> usize {
    env_or("MOCK_INITIAL_MARKERS", DEFAULT_MOCK_INITIAL_MARKERS)
}

pub fn fleet_size() -> usize {
    env_or("SIM_FLEET_SIZE", DEFAULT_FLEET_SIZE)
}

pub fn rpc_token() -> Option<String> {
    env::var("RPC_TOKEN")
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Everything `run_with_settings` needs, gathered once at startup.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub queue_capacity: usize,
    pub sessions: SessionSettings,
    // Markers in the central simulated fleet; 0 disables it.
    pub fleet_size: usize,
    pub fleet_tick_interval: Duration,
    pub rpc_token: Option<String>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let tick_interval = tick_interval();
        Self {
            queue_capacity: subscriber_queue_capacity(),
            sessions: SessionSettings {
                connect_grace: connect_grace(),
                tick_interval,
                source: marker_source(),
                mock_initial_markers: mock_initial_markers(),
            },
            fleet_size: fleet_size(),
            fleet_tick_interval: tick_interval,
            rpc_token: rpc_token(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sessions: SessionSettings {
                connect_grace: DEFAULT_CONNECT_GRACE,
                tick_interval: DEFAULT_TICK_INTERVAL,
                source: SourceKind::Api,
                mock_initial_markers: DEFAULT_MOCK_INITIAL_MARKERS,
            },
            fleet_size: DEFAULT_FLEET_SIZE,
            fleet_tick_interval: DEFAULT_TICK_INTERVAL,
            rpc_token: None,
        }
    }
}
