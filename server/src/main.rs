use clap::Parser;
use log::{error, info};
use pung_server::config::{ServerConfig, DEFAULT_MAX_LOBBIES};
use pung_server::network::Server;
use pung_shared::{DEFAULT_MAX_CLOCK_DRIFT_MS, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Milliseconds a peer gets to acknowledge a close before the socket is dropped
    #[arg(long, default_value = "5000")]
    close_timeout_ms: u64,

    /// Largest accepted clock difference in a handshake, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_CLOCK_DRIFT_MS)]
    max_clock_drift_ms: i64,

    /// Maximum number of open lobbies
    #[arg(long, default_value_t = DEFAULT_MAX_LOBBIES)]
    max_lobbies: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            close_timeout: Duration::from_millis(args.close_timeout_ms),
            max_clock_drift_ms: args.max_clock_drift_ms,
            max_lobbies: args.max_lobbies,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for detailed logging");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {} (max {} lobbies)",
        config.address(),
        config.max_lobbies
    );

    let server = Server::new(config).await?;
    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
