//! # Pung Server Library
//!
//! The authoritative side of a Pung session. The server issues identities,
//! owns every lobby, and decides who may change what.
//!
//! ## Core Responsibilities
//!
//! ### Identity
//! A handshake is checked for clock drift and a valid username. On success
//! the username is sanitized and the connection is issued a session ID.
//!
//! ### Lobby Authority
//! Lobbies live in a single registry shared by all connections. Only a
//! lobby's admin may change its settings, delete it, or start its game, and
//! admin rights are always derived from the lobby's member list.
//!
//! ### Broadcasting
//! Lobby changes are pushed to every member with `broadcastLobbyUpdate`,
//! `ackRemovedFromLobby` or `broadcastGameStarted`.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The accept loop spawns one task per websocket. That task drains the
//! connection's event channel into a [`router::ServerRouter`], so actions
//! from a single peer are handled strictly in order.
//!
//! ### Shared State
//! The registry and the session table sit behind their own `RwLock`s in
//! [`network::ServerState`]. Every mutation takes the registry lock first,
//! and broadcasts are sent before it is released, so no member ever sees a
//! torn membership list.
//!
//! ### Failure Scope
//! Protocol faults, authorization faults and validation faults are answered
//! on the offending connection only. Nothing here stops the process.
//!
//! ## Module Organization
//!
//! - `config`: startup configuration
//! - `error`: registry and server error types
//! - `network`: listener, accept loop and per-connection task
//! - `registry`: lobby registry
//! - `router`: per-connection action routing
//! - `sessions`: session ID to connection table
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pung_server::config::ServerConfig;
//! use pung_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!     println!("Listening on {}", server.local_addr()?);
//!
//!     // Accepts connections until the task is dropped
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod registry;
pub mod router;
pub mod sessions;
