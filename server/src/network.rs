//! Server network layer accepting websocket connections

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::LobbyRegistry;
use crate::router::ServerRouter;
use crate::sessions::SessionTable;
use log::{debug, error, info, warn};
use pung_shared::{Actor, Connection, ConnectionEvent, IdentityService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::accept_async;

/// State shared by every connection task
///
/// Lock order: `registry` before `sessions`.
pub struct ServerState {
    pub config: ServerConfig,
    pub identity: IdentityService,
    pub registry: RwLock<LobbyRegistry>,
    pub sessions: RwLock<SessionTable>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let identity = IdentityService::default();
        let registry = LobbyRegistry::new(identity.clone(), config.max_lobbies);

        Self {
            config,
            identity,
            registry: RwLock::new(registry),
            sessions: RwLock::new(SessionTable::new()),
        }
    }
}

/// Main server accepting connections and handing each to its own router
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: Arc::new(ServerState::new(config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(state, stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(state: Arc<ServerState>, stream: TcpStream, addr: SocketAddr) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Websocket upgrade from {} failed: {}", addr, e);
            return;
        }
    };
    info!("Client connected from {}", addr);

    let close_timeout = state.config.close_timeout;
    let (connection, mut events) = Connection::spawn(Actor::Server, socket, close_timeout);
    let mut router = ServerRouter::new(state, connection, addr);

    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Action(inbound) => router.handle(inbound).await,
            ConnectionEvent::Close { code, reason } => {
                info!(
                    "Client {} disconnected (code {:?}) {}",
                    addr, code, reason
                );
                break;
            }
            ConnectionEvent::Error(e) => warn!("Connection fault for {}: {}", addr, e),
        }
    }

    router.disconnect().await;
    debug!("Connection task for {} finished", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start_server() -> SocketAddr {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let addr = start_server().await;
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = ServerConfig {
            port,
            ..ServerConfig::default()
        };
        match Server::new(config).await {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{}", port)),
            Err(e) => panic!("Wrong error type: {}", e),
            Ok(_) => panic!("Bound an invalid address"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_releases_session() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let state = server.state();
        tokio::spawn(server.run());

        let (mut socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        socket
            .send(Message::Text(
                json!({"type": "handshake", "data": {"username": "Ann", "timestamp": pung_shared::utils::get_timestamp()}})
                    .to_string(),
            ))
            .await
            .unwrap();

        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(frame["type"], "ackHandshake");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        assert_eq!(state.sessions.read().await.len(), 1);

        socket.close(None).await.unwrap();
        drop(socket);

        for _ in 0..50 {
            if state.sessions.read().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Session was not released after disconnect");
    }

    async fn next_json<S>(socket: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_protocol_fault_releases_silent_peer() {
        let config = ServerConfig {
            port: 0,
            close_timeout: Duration::from_millis(200),
            ..ServerConfig::default()
        };
        let server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let state = server.state();
        tokio::spawn(server.run());

        let (mut socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        socket
            .send(Message::Text(
                json!({"type": "handshake", "data": {"username": "Ann", "timestamp": pung_shared::utils::get_timestamp()}})
                    .to_string(),
            ))
            .await
            .unwrap();
        let ack = next_json(&mut socket).await;
        let session_id = ack["data"]["sessionID"].as_str().unwrap().to_string();

        socket
            .send(Message::Text(
                json!({"type": "createLobby", "data": {"username": "Ann", "sessionID": session_id}})
                    .to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(next_json(&mut socket).await["type"], "ackJoinLobby");
        assert_eq!(state.registry.read().await.len(), 1);

        // The 1007 close is never acknowledged since the peer stops reading
        socket
            .send(Message::Text("not json".to_string()))
            .await
            .unwrap();

        for _ in 0..150 {
            if state.sessions.read().await.is_empty() && state.registry.read().await.is_empty() {
                drop(socket);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Silent peer kept its session and lobby after a protocol fault");
    }
}
