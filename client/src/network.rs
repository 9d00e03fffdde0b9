use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::router::{ClientCommand, ClientEvent, ClientRouter};
use log::{debug, error, info, warn};
use pung_shared::utils::get_timestamp;
use pung_shared::{Actor, Connection, ConnectionEvent};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;

pub struct Client {
    config: ClientConfig,
    connection: Connection,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    router: ClientRouter,
}

impl Client {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        info!("Connecting to {}...", config.server);
        let (socket, _) = connect_async(config.server.as_str()).await?;
        let (connection, events) = Connection::spawn(Actor::Client, socket, config.close_timeout);
        let router = ClientRouter::new(config.username.clone());

        Ok(Client {
            config,
            connection,
            events,
            router,
        })
    }

    pub fn router(&self) -> &ClientRouter {
        &self.router
    }

    /// Drives the session until the server goes away or `Quit` arrives.
    ///
    /// Commands come from the UI; everything worth showing goes back out on
    /// `ui`. Sends the handshake first and pings on the configured interval.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
        ui: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<(), ClientError> {
        let handshake = self.router.handshake(chrono::Utc::now().to_rfc3339())?;
        self.connection.dispatch(handshake);

        let mut ping_interval = interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick since it fires immediately
        ping_interval.tick().await;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(ConnectionEvent::Action(inbound)) => {
                            match self.router.handle(inbound, get_timestamp()) {
                                Ok(Some(event)) => send_ui(&ui, event),
                                Ok(None) => {}
                                Err(e) => {
                                    warn!("Bad action from server: {}", e);
                                    self.connection.respond_error(e.close_code(), e.error_code(), e.to_string());
                                }
                            }
                        }
                        Some(ConnectionEvent::Close { code, reason }) => {
                            info!("Disconnected from server (code {:?})", code);
                            send_ui(&ui, ClientEvent::Disconnected { code, reason });
                            break;
                        }
                        Some(ConnectionEvent::Error(e)) => error!("Connection fault: {}", e),
                        None => break,
                    }
                },

                command = commands.recv() => {
                    match command {
                        Some(ClientCommand::Quit) | None => {
                            self.quit().await;
                            break;
                        }
                        Some(command) => self.send_command(command, &ui),
                    }
                },

                _ = ping_interval.tick() => {
                    if self.connection.is_open() {
                        self.send_command(ClientCommand::Ping, &ui);
                    }
                },
            }
        }

        Ok(())
    }

    fn send_command(&mut self, command: ClientCommand, ui: &mpsc::UnboundedSender<ClientEvent>) {
        debug!("Command {:?}", command);
        match self.router.command(command, get_timestamp()) {
            Ok(Some(action)) => self.connection.dispatch(action),
            Ok(None) => {}
            Err(e) => {
                warn!("Command refused: {}", e);
                send_ui(ui, ClientEvent::Rejected {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn quit(&mut self) {
        if self.router.session_id().is_some() {
            if let Ok(Some(logoff)) = self.router.command(ClientCommand::Logoff, get_timestamp()) {
                self.connection.dispatch(logoff);
            }
        }
        self.connection.close().await;
        info!("Connection closed");
    }
}

fn send_ui(ui: &mpsc::UnboundedSender<ClientEvent>, event: ClientEvent) {
    if ui.send(event).is_err() {
        debug!("UI is no longer listening");
    }
}
