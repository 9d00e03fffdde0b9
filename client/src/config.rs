use pung_shared::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_PORT};
use std::time::Duration;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(5000);

pub fn default_server_url() -> String {
    format!("ws://127.0.0.1:{}", DEFAULT_PORT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket URL of the server
    pub server: String,
    pub username: String,
    /// Lobby code to join once authenticated; a new lobby is created when unset
    pub join: Option<String>,
    pub ping_interval: Duration,
    pub close_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            join: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}
