// Frameworks: runtime bootstrap and configuration.

pub mod config;
pub mod server;
