use clap::Parser;
use log::{error, info, warn};
use pung_client::config::{default_server_url, ClientConfig};
use pung_client::network::Client;
use pung_client::router::{ClientCommand, ClientEvent};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Websocket URL of the server
    #[arg(short = 's', long, default_value_t = default_server_url())]
    server: String,

    /// Name to play under
    #[arg(short = 'u', long)]
    username: String,

    /// Lobby code to join; creates a new lobby when omitted
    #[arg(short = 'j', long)]
    join: Option<String>,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "5000")]
    ping_interval_ms: u64,

    /// Milliseconds to wait for the server to acknowledge a close
    #[arg(long, default_value = "5000")]
    close_timeout_ms: u64,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        ClientConfig {
            server: args.server,
            username: args.username,
            join: args.join,
            ping_interval: Duration::from_millis(args.ping_interval_ms),
            close_timeout: Duration::from_millis(args.close_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for detailed logging");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ClientConfig::from(Args::parse());
    let join = config.join.clone();

    let client = Client::connect(config).await?;
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let client_handle = tokio::spawn(client.run(command_rx, event_tx));

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        if let Some(command) = react(&event, join.as_deref()) {
                            let _ = command_tx.send(command);
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, logging off");
                let _ = command_tx.send(ClientCommand::Quit);
            }
        }
    }

    client_handle.await??;
    Ok(())
}

/// Logs an event and picks the follow-up command, standing in for a UI.
fn react(event: &ClientEvent, join: Option<&str>) -> Option<ClientCommand> {
    match event {
        ClientEvent::Authenticated { username, .. } => {
            info!("Logged in as {}", username);
            Some(match join {
                Some(code) => ClientCommand::JoinLobby(code.to_string()),
                None => ClientCommand::CreateLobby,
            })
        }
        ClientEvent::HandshakeDenied { reason } => {
            error!("Handshake denied: {}", reason);
            Some(ClientCommand::Quit)
        }
        ClientEvent::Latency {
            round_trip_ms,
            internal_latency_ms,
            ..
        } => {
            info!(
                "Ping {}ms (server internal {}ms)",
                round_trip_ms,
                internal_latency_ms.unwrap_or(-1)
            );
            None
        }
        ClientEvent::JoinedLobby(lobby) => {
            info!(
                "In lobby {} with {} player(s), first to {}",
                lobby.lobby_id,
                lobby.users.len(),
                lobby.settings.win_score
            );
            None
        }
        ClientEvent::LobbyNotFound { lobby_id } => {
            warn!("No lobby with code {}", lobby_id);
            Some(ClientCommand::Quit)
        }
        ClientEvent::LobbyUpdated(lobby) => {
            let names: Vec<&str> = lobby.users.iter().map(|u| u.username.as_str()).collect();
            info!(
                "Lobby {}: [{}], first to {} on {:?}",
                lobby.lobby_id,
                names.join(", "),
                lobby.settings.win_score,
                lobby.settings.difficulty
            );
            None
        }
        ClientEvent::RemovedFromLobby { lobby_id, reason } => {
            warn!("Removed from lobby {} ({:?})", lobby_id, reason);
            None
        }
        ClientEvent::GameStarted { lobby_id } => {
            info!("Game started in lobby {}", lobby_id);
            None
        }
        ClientEvent::GameUpdate(update) => {
            info!("Game update for {}", update.lobby_id);
            None
        }
        ClientEvent::ServerError { code, message, .. } => {
            error!(
                "Server error {} ({}): {}",
                code.code(),
                code.name(),
                message.as_deref().unwrap_or("")
            );
            None
        }
        ClientEvent::Rejected { reason } => {
            warn!("{}", reason);
            None
        }
        ClientEvent::Disconnected { code, reason } => {
            info!("Disconnected ({:?}) {}", code, reason);
            None
        }
    }
}
