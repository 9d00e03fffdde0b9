//! Startup configuration for the server.

use pung_shared::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_MAX_CLOCK_DRIFT_MS, DEFAULT_PORT};
use std::time::Duration;

pub const DEFAULT_MAX_LOBBIES: usize = 1024;

/// Read once at startup; never consulted again for a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Grace period for a graceful websocket close
    pub close_timeout: Duration,
    /// Largest accepted difference between the handshake timestamp and now
    pub max_clock_drift_ms: i64,
    pub max_lobbies: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_clock_drift_ms: DEFAULT_MAX_CLOCK_DRIFT_MS,
            max_lobbies: DEFAULT_MAX_LOBBIES,
        }
    }
}
