use crate::use_cases::{MapHub, SessionSettings};
use std::sync::Arc;

pub struct AppState {
    // Registry and map-level channels shared by every connection.
    pub hub: Arc<MapHub>,
    // How view sockets mount and tick.
    pub sessions: SessionSettings,
    // Bearer token required on the RPC routes, if set.
    pub rpc_token: Option<Arc<str>>,
}
