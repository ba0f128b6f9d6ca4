// Interface adapters: wire protocol, JSON-RPC and network handling.

pub mod http;
pub mod net;
pub mod protocol;
pub mod rpc;
pub mod state;
