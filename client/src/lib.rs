//! # Pung Client Library
//!
//! The client side of a Pung session. It connects to a server, performs the
//! handshake, keeps a heartbeat going, and mirrors the session and lobby
//! state the server reports.
//!
//! ## Architecture Overview
//!
//! The UI never touches the socket. It talks to the client through two
//! channels:
//!
//! - [`router::ClientCommand`] in: create, join, change settings, delete,
//!   start, ping, logoff, quit.
//! - [`router::ClientEvent`] out: authentication results, latency readings,
//!   lobby snapshots, server errors and disconnects.
//!
//! ### Phase Gating
//! Commands are checked against the current phase before anything is sent.
//! Creating a lobby while already in one, or changing settings without being
//! the admin, is refused locally with a [`error::ClientError`].
//!
//! ### Heartbeat
//! A `ping` goes out on a fixed interval. The matching `pong` yields the
//! round trip measured locally plus the server's own latency figures.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Server URL, username, optional lobby code and timing.
//!
//! ### Network Module (`network`)
//! Owns the connection and runs the select loop joining socket events, UI
//! commands and the heartbeat.
//!
//! ### Router Module (`router`)
//! The session state machine, independent of any socket.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pung_client::config::ClientConfig;
//! use pung_client::network::Client;
//! use pung_client::router::ClientCommand;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("ws://127.0.0.1:6942", "Ann");
//!     let client = Client::connect(config).await?;
//!
//!     let (commands, command_rx) = mpsc::unbounded_channel();
//!     let (event_tx, mut events) = mpsc::unbounded_channel();
//!     let session = tokio::spawn(client.run(command_rx, event_tx));
//!
//!     // Wait for the handshake, then open a lobby and leave again
//!     if let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!         commands.send(ClientCommand::CreateLobby)?;
//!     }
//!     commands.send(ClientCommand::Quit)?;
//!
//!     session.await??;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod router;
