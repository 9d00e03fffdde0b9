//! Authenticated sessions and the connections they are bound to
//!
//! A session exists from a successful handshake until logoff or disconnect.
//! The table is how lobby broadcasts find the connection of every member.

use log::{debug, info};
use pung_shared::{Action, Connection, LobbyUser};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// One authenticated connection
#[derive(Clone)]
pub struct SessionEntry {
    pub session_id: String,
    /// Username after sanitizing
    pub username: String,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connection: Connection,
    pub authenticated_at: Instant,
}

impl SessionEntry {
    pub fn new(session_id: String, username: String, addr: SocketAddr, connection: Connection) -> Self {
        Self {
            session_id,
            username,
            addr,
            connection,
            authenticated_at: Instant::now(),
        }
    }
}

/// Session ID to connection mapping
#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<String, SessionEntry>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, entry: SessionEntry) {
        info!(
            "Session {} bound to {} ({})",
            entry.session_id, entry.username, entry.addr
        );
        self.sessions.insert(entry.session_id.clone(), entry);
    }

    /// Returns the entry if the session was bound.
    pub fn unbind(&mut self, session_id: &str) -> Option<SessionEntry> {
        let entry = self.sessions.remove(session_id)?;
        info!(
            "Session {} of {} ended after {:.1}s",
            session_id,
            entry.username,
            entry.authenticated_at.elapsed().as_secs_f32()
        );
        Some(entry)
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionEntry> {
        self.sessions.get(session_id)
    }

    /// Sends an action to one session. Returns false if it is not bound.
    pub fn send_to(&self, session_id: &str, action: Action) -> bool {
        match self.sessions.get(session_id) {
            Some(entry) => {
                entry.connection.dispatch(action);
                true
            }
            None => false,
        }
    }

    /// Sends an action to every listed lobby member except `exclude`.
    /// Returns how many connections it was handed to.
    pub fn broadcast(&self, members: &[LobbyUser], action: &Action, exclude: Option<&str>) -> usize {
        let mut sent = 0;
        for member in members {
            if Some(member.session_id.as_str()) == exclude {
                continue;
            }

            if self.send_to(&member.session_id, action.clone()) {
                sent += 1;
            } else {
                debug!("No connection bound for lobby member {}", member.session_id);
            }
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pung_shared::payload::PingData;
    use pung_shared::{ActionType, Actor, DEFAULT_CLOSE_TIMEOUT};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

    type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn bound_connection() -> (Connection, SocketAddr, Peer) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { connect_async(format!("ws://{}", addr)).await.unwrap().0 });

        let (stream, peer_addr) = listener.accept().await.unwrap();
        let socket = accept_async(stream).await.unwrap();
        let (connection, _events) = Connection::spawn(Actor::Server, socket, DEFAULT_CLOSE_TIMEOUT);
        (connection, peer_addr, connect.await.unwrap())
    }

    fn member(session_id: &str) -> LobbyUser {
        LobbyUser {
            session_id: session_id.to_string(),
            username: "member".to_string(),
            is_admin: false,
        }
    }

    fn ping() -> Action {
        Action::new(ActionType::Ping, &PingData { timestamp: 1 }).unwrap()
    }

    #[tokio::test]
    async fn test_bind_and_unbind() {
        let (connection, addr, _peer) = bound_connection().await;
        let mut table = SessionTable::new();
        assert!(table.is_empty());

        table.bind(SessionEntry::new("s1".into(), "Ann".into(), addr, connection));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("s1").map(|e| e.username.as_str()), Some("Ann"));

        let entry = table.unbind("s1").unwrap();
        assert_eq!(entry.addr, addr);
        assert!(table.unbind("s1").is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_with_exclusion() {
        let (first, first_addr, mut first_peer) = bound_connection().await;
        let (second, second_addr, mut second_peer) = bound_connection().await;

        let mut table = SessionTable::new();
        table.bind(SessionEntry::new("s1".into(), "Ann".into(), first_addr, first));
        table.bind(SessionEntry::new("s2".into(), "Bob".into(), second_addr, second));

        let members = vec![member("s1"), member("s2"), member("gone")];
        assert_eq!(table.broadcast(&members, &ping(), Some("s1")), 1);
        assert_eq!(table.broadcast(&members, &ping(), None), 2);

        // s2 receives both broadcasts, s1 only the second
        use futures_util::StreamExt;
        for _ in 0..2 {
            match second_peer.next().await {
                Some(Ok(Message::Text(text))) => assert!(text.contains("\"ping\"")),
                other => panic!("Wrong message type: {:?}", other),
            }
        }
        match first_peer.next().await {
            Some(Ok(Message::Text(text))) => assert!(text.contains("\"ping\"")),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_send_to_unknown_session() {
        let table = SessionTable::new();
        assert!(!table.send_to("nobody", ping()));
    }
}
