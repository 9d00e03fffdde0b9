//! Connection session wrapping exactly one websocket.
//!
//! A [`Connection`] owns the socket for the lifetime of the connection. It
//! splits the socket into a reader task and a writer task:
//!
//! - The reader turns raw frames into validated [`InboundAction`]s. Frames
//!   that are not JSON, or not shaped like an action, are answered with an
//!   error frame and a `1007` close; they never reach the subscriber.
//! - The writer drains an outbound queue, so [`Connection::dispatch`] and
//!   [`Connection::respond_error`] never block the caller.
//!
//! Everything the connection has to say to its owner arrives on the
//! [`ConnectionEvent`] channel returned by [`Connection::spawn`].
//!
//! ## Lifecycle
//!
//! `Connecting → Open → Closing → Closed`. A socket handed to `spawn` has
//! already completed the websocket upgrade, which counts as the open
//! notification. Every close is bounded, whether it comes from
//! [`Connection::close`], a fatal error response or a failed send: if the peer
//! does not acknowledge within the configured timeout the tasks are aborted
//! and the socket is dropped.

use crate::action::{Action, ActionType, Actor, ErrorAction, InboundAction, TransferAction};
use crate::codec;
use crate::error::{CodecError, ConnectionError};
use crate::error_code::{CloseCode, ErrorCode};
use crate::utils::get_timestamp;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Grace period for a graceful close before the socket is terminated.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(5000);

const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Notifications delivered to the owner of a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A validated inbound action.
    Action(InboundAction),
    /// The connection reached `Closed`. `code` is `None` when no close frame
    /// was received, e.g. after a forced termination.
    Close { code: Option<u16>, reason: String },
    /// A local fault such as dispatch misuse or a failed send.
    Error(ConnectionError),
}

#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    last_dispatch: i64,
    last_receive: i64,
    last_message_timestamp: i64,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            last_dispatch: -1,
            last_receive: -1,
            last_message_timestamp: -1,
        }
    }

    fn mark_open(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
            return true;
        }
        false
    }

    fn begin_close(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closing;
                true
            }
            ConnectionState::Closing | ConnectionState::Closed => false,
        }
    }

    fn mark_closed(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        true
    }
}

enum Outbound {
    Action(String),
    Error {
        text: String,
        close: Option<CloseCode>,
    },
    Close {
        code: u16,
        reason: String,
    },
}

struct Shared {
    actor: Actor,
    close_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    closed_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        // The owner may already have stopped listening
        let _ = self.events.send(event);
    }

    /// Moves to `Closing` and arms the close deadline. Whoever starts the
    /// close, `Closed` is reached within `close_timeout`.
    fn begin_close(self: &Arc<Self>) -> bool {
        if !self.lifecycle.lock().begin_close() {
            return false;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(enforce_close_deadline(Arc::clone(self)));
            }
            Err(e) => warn!("No runtime to enforce the close deadline: {}", e),
        }
        true
    }

    /// Moves to `Closed` exactly once, notifying the owner and every pending
    /// `close()` call.
    fn finish(&self, code: Option<u16>, reason: String) -> bool {
        if !self.lifecycle.lock().mark_closed() {
            return false;
        }

        debug!("{} connection closed (code {:?})", self.actor, code);
        self.emit(ConnectionEvent::Close { code, reason });
        self.closed_tx.send_replace(true);

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        true
    }
}

/// Handle to one connection session. Cheap to clone; all clones drive the
/// same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: watch::Receiver<bool>,
}

impl Connection {
    /// Takes ownership of an upgraded socket and starts its reader and
    /// writer tasks. Must be called from within a tokio runtime.
    pub fn spawn<S>(
        actor: Actor,
        socket: WebSocketStream<S>,
        close_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let mut lifecycle = Lifecycle::new();
        lifecycle.mark_open();

        let shared = Arc::new(Shared {
            actor,
            close_timeout,
            lifecycle: Mutex::new(lifecycle),
            events: events_tx,
            closed_tx,
            tasks: Mutex::new(Vec::with_capacity(2)),
        });

        let connection = Connection {
            shared: Arc::clone(&shared),
            outbound: outbound_tx,
            closed: closed_rx,
        };

        let (sink, stream) = socket.split();
        let writer = tokio::spawn(run_writer(sink, outbound_rx, Arc::clone(&shared)));
        let reader = tokio::spawn(run_reader(stream, connection.clone()));

        {
            let mut tasks = shared.tasks.lock();
            tasks.push(writer.abort_handle());
            tasks.push(reader.abort_handle());

            // The reader may have finished before its handle was stored
            if shared.lifecycle.lock().state == ConnectionState::Closed {
                for task in tasks.drain(..) {
                    task.abort();
                }
            }
        }

        (connection, events_rx)
    }

    pub fn actor(&self) -> Actor {
        self.shared.actor
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Epoch milliseconds of the last dispatched action, `-1` if none.
    pub fn last_dispatch(&self) -> i64 {
        self.shared.lifecycle.lock().last_dispatch
    }

    /// Epoch milliseconds of the last valid inbound action, `-1` if none.
    pub fn last_receive(&self) -> i64 {
        self.shared.lifecycle.lock().last_receive
    }

    /// Epoch milliseconds of the last inbound frame of any kind, `-1` if none.
    pub fn last_message_timestamp(&self) -> i64 {
        self.shared.lifecycle.lock().last_message_timestamp
    }

    pub fn close_timeout(&self) -> Duration {
        self.shared.close_timeout
    }

    /// Sends an action to the peer. No-op unless the connection is open.
    ///
    /// Misuse (an `error` action, or empty data) is reported as a
    /// [`ConnectionEvent::Error`] and nothing is sent.
    pub fn dispatch(&self, action: Action) {
        if !self.is_open() {
            return;
        }

        let kind = action.kind;
        match self.encode(action) {
            Ok(frame) => self.send(Outbound::Action(frame)),
            Err(e) => {
                warn!("Refused to dispatch '{}': {}", kind, e);
                self.shared.emit(ConnectionEvent::Error(e));
            }
        }
    }

    /// Sends an error frame. With a close code the connection is closed right
    /// after the frame is written; without one it stays open. Never fails
    /// locally.
    pub fn respond_error(&self, close: Option<CloseCode>, code: ErrorCode, message: impl Into<String>) {
        self.send_error(close, ErrorAction::new(code, Some(message.into()), None));
    }

    /// Like [`respond_error`](Self::respond_error), naming the action type
    /// that provoked the error.
    pub fn respond_error_to(
        &self,
        close: Option<CloseCode>,
        code: ErrorCode,
        message: impl Into<String>,
        response_to: &str,
    ) {
        self.send_error(
            close,
            ErrorAction::new(code, Some(message.into()), Some(response_to.to_string())),
        );
    }

    /// Closes the connection. Resolves once `Closed` is reached, forcing
    /// termination after the close timeout. Safe to call more than once.
    pub async fn close(&self) {
        if self.shared.begin_close() {
            debug!("Closing {} connection", self.shared.actor);
            if self
                .outbound
                .send(Outbound::Close {
                    code: NORMAL_CLOSURE,
                    reason: String::new(),
                })
                .is_err()
            {
                self.shared
                    .finish(None, "connection writer already gone".to_string());
            }
        }

        self.closed().await;
    }

    /// Waits until the connection reaches `Closed`, without initiating it.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|done| *done).await;
    }

    fn encode(&self, mut action: Action) -> Result<String, ConnectionError> {
        if action.kind == ActionType::Error {
            return Err(ConnectionError::ErrorDispatched);
        }
        if action.data.is_empty() {
            return Err(ConnectionError::EmptyData(action.kind.as_str()));
        }

        let now = get_timestamp();
        let mut lifecycle = self.shared.lifecycle.lock();

        if action.kind == ActionType::Pong {
            codec::inject_internal_latency(&mut action.data, now, lifecycle.last_message_timestamp);
        }

        let frame = codec::serialize(&TransferAction::outbound(action, self.shared.actor, now))?;
        lifecycle.last_dispatch = now;
        Ok(frame)
    }

    fn send_error(&self, close: Option<CloseCode>, response: ErrorAction) {
        if !self.is_open() {
            return;
        }

        // Once a fatal error is queued nothing else may be dispatched
        if close.is_some() {
            self.shared.begin_close();
        }

        match codec::serialize_error(&response) {
            Ok(text) => self.send(Outbound::Error { text, close }),
            Err(e) => {
                error!("Could not encode error response: {}", e);
                self.shared.emit(ConnectionEvent::Error(e.into()));
                self.shared.begin_close();
                self.send(Outbound::Close {
                    code: CloseCode::InternalFault.code(),
                    reason: ErrorCode::Internal.name().to_string(),
                });
            }
        }
    }

    fn send(&self, frame: Outbound) {
        if self.outbound.send(frame).is_err() {
            self.shared
                .emit(ConnectionEvent::Error(ConnectionError::WriterGone));
        }
    }

    fn handle_frame(&self, raw: &[u8]) {
        let now = get_timestamp();
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.mark_open();
            if lifecycle.state != ConnectionState::Open {
                return;
            }
            lifecycle.last_message_timestamp = now;
        }

        let actor = self.shared.actor;
        match codec::decode(raw) {
            Ok(inbound) => {
                self.shared.lifecycle.lock().last_receive = now;
                self.shared.emit(ConnectionEvent::Action(inbound));
            }
            Err(CodecError::Malformed(e)) => {
                warn!("Received unparseable payload: {}", e);
                self.respond_error(
                    Some(CloseCode::ProtocolViolation),
                    ErrorCode::MalformedPayload,
                    format!("The payload data you sent could not be parsed by this {}: {}", actor, e),
                );
            }
            Err(e) => {
                warn!("Received invalid action: {}", e);
                self.respond_error(
                    Some(CloseCode::ProtocolViolation),
                    ErrorCode::InvalidAction,
                    format!("The payload data you sent to this {} is not a valid action: {}", actor, e),
                );
            }
        }
    }
}

async fn enforce_close_deadline(shared: Arc<Shared>) {
    let mut closed = shared.closed_tx.subscribe();
    let graceful = timeout(shared.close_timeout, closed.wait_for(|done| *done))
        .await
        .is_ok();

    if !graceful {
        warn!(
            "Peer did not acknowledge close within {:?}, terminating",
            shared.close_timeout
        );
        shared.finish(None, "terminated after close timeout".to_string());
    }
}

fn close_message(code: u16, reason: String) -> Message {
    Message::Close(Some(CloseFrame {
        code: WsCloseCode::from(code),
        reason: Cow::Owned(reason),
    }))
}

async fn run_writer<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Action(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    error!("Failed to send action: {}", e);
                    shared.emit(ConnectionEvent::Error(e.into()));
                    shared.begin_close();
                    let _ = sink.close().await;
                    break;
                }
            }
            Outbound::Error { text, close } => {
                let sent = sink.send(Message::Text(text)).await;
                let close_code = match (&sent, close) {
                    (_, Some(code)) => Some(code.code()),
                    (Err(_), None) => Some(CloseCode::InternalFault.code()),
                    (Ok(_), None) => None,
                };

                if let Err(e) = sent {
                    error!("Failed to send error response: {}", e);
                    shared.emit(ConnectionEvent::Error(e.into()));
                }

                if let Some(code) = close_code {
                    shared.begin_close();
                    let _ = sink.send(close_message(code, String::new())).await;
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let _ = sink.send(close_message(code, reason)).await;
                break;
            }
        }
    }
}

async fn run_reader<S>(mut stream: SplitStream<WebSocketStream<S>>, connection: Connection)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut close_frame: Option<(u16, String)> = None;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => connection.handle_frame(text.as_bytes()),
            Ok(Message::Binary(bytes)) => connection.handle_frame(&bytes),
            Ok(Message::Close(frame)) => {
                close_frame = frame.map(|f| (u16::from(f.code), f.reason.into_owned()));
                connection.shared.begin_close();
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
            Err(e) => {
                error!("Transport error on {} connection: {}", connection.shared.actor, e);
                connection.shared.emit(ConnectionEvent::Error(e.into()));
                break;
            }
        }
    }

    let (code, reason) = match close_frame {
        Some((code, reason)) => (Some(code), reason),
        None => (None, String::new()),
    };
    connection.shared.finish(code, reason);
}
