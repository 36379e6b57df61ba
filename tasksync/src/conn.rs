//! WebSocket connection manager for the sync gateway link.
//!
//! Owns one duplex connection's lifecycle. Inbound frames are decoded on a
//! background reader task and surfaced to the engine as [`ConnEvent`]s;
//! outbound sends are best-effort and never queued. Connection errors are
//! all non-fatal: every failure path ends in the close/reconnect sequence
//! with a fixed, non-growing retry interval.
//!
//! # Reconnect liveness
//!
//! A reconnect timer never captures the identity that was current when it
//! was armed. When it fires it asks the shared [`Session`] whether anyone
//! is still logged in, and resolves to a no-op otherwise — so logout stops
//! retries promptly without any explicit timer cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use tasksync_proto::envelope::{self, ClientMessage, ServerMessage};

use crate::session::Session;

/// Write half of the WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Read half of the WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Fixed delay before a reconnect attempt. Deliberately constant — the
/// design trades backoff sophistication for auditability.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default timeout for establishing the WebSocket connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle states of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No connection and none being established.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; sends are accepted.
    Open,
    /// A local close is in progress.
    Closing,
}

/// Events surfaced from the connection manager to the engine loop.
#[derive(Debug)]
pub enum ConnEvent {
    /// The connection is open; the engine should request a full load.
    Ready,
    /// A decoded inbound server message.
    Inbound(ServerMessage),
    /// The connection dropped (server close or transport error).
    Closed,
    /// A reconnect timer fired while the session was still live.
    RetryDue,
}

/// Manages the single gateway connection for one engine.
///
/// Driven entirely by the engine task; only the reader task and reconnect
/// timers run concurrently, and both communicate through the event channel.
pub struct ConnectionManager {
    /// Gateway WebSocket URL.
    url: String,
    /// How long to wait for the connect handshake.
    connect_timeout: Duration,
    /// Fixed reconnect interval.
    reconnect_delay: Duration,
    /// Shared session context for fire-time liveness checks.
    session: Arc<Session>,
    /// Channel feeding the engine loop.
    events_tx: mpsc::Sender<ConnEvent>,
    state: ConnState,
    ws_sender: Option<WsSender>,
    /// Background reader for the current connection.
    reader_handle: Option<tokio::task::JoinHandle<()>>,
    /// Guard ensuring at most one in-flight reconnect timer.
    retry_pending: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(
        url: String,
        connect_timeout: Duration,
        reconnect_delay: Duration,
        session: Arc<Session>,
        events_tx: mpsc::Sender<ConnEvent>,
    ) -> Self {
        Self {
            url,
            connect_timeout,
            reconnect_delay,
            session,
            events_tx,
            state: ConnState::Disconnected,
            ws_sender: None,
            reader_handle: None,
            retry_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnState {
        self.state
    }

    /// Establishes the connection.
    ///
    /// On success the state becomes `Open`, a reader task is spawned, and
    /// a [`ConnEvent::Ready`] is emitted. On failure the state returns to
    /// `Disconnected` and one reconnect attempt is scheduled.
    pub async fn open(&mut self) {
        if matches!(self.state, ConnState::Open | ConnState::Connecting) {
            tracing::debug!(state = ?self.state, "open ignored, connection already live");
            return;
        }
        self.state = ConnState::Connecting;

        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(&self.url)).await;
        let ws_stream = match attempt {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                tracing::warn!(url = %self.url, error = %e, "gateway connect failed");
                self.state = ConnState::Disconnected;
                self.schedule_retry();
                return;
            }
            Err(_) => {
                tracing::warn!(url = %self.url, "gateway connect timed out");
                self.state = ConnState::Disconnected;
                self.schedule_retry();
                return;
            }
        };

        let (ws_sender, ws_reader) = ws_stream.split();
        self.ws_sender = Some(ws_sender);
        self.reader_handle = Some(tokio::spawn(reader_loop(
            ws_reader,
            self.events_tx.clone(),
        )));
        self.state = ConnState::Open;
        tracing::info!(url = %self.url, "gateway connection open");

        if self.events_tx.send(ConnEvent::Ready).await.is_err() {
            tracing::debug!("engine dropped before ready event");
        }
    }

    /// Sends one outbound message, best-effort.
    ///
    /// When the connection is not `Open` the message is dropped with a
    /// warning — outbound delivery is never queued or retried. A transport
    /// failure transitions to `Disconnected`, emits [`ConnEvent::Closed`]
    /// so the engine learns of the drop even if the reader never got to
    /// report it, and schedules a reconnect.
    pub async fn send(&mut self, msg: &ClientMessage) {
        if self.state != ConnState::Open {
            tracing::warn!(state = ?self.state, ?msg, "not connected, dropping outbound message");
            return;
        }
        let text = match envelope::encode_client(msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound message");
                return;
            }
        };
        let Some(sender) = self.ws_sender.as_mut() else {
            tracing::warn!("open state without a sender half");
            return;
        };
        if let Err(e) = sender.send(Message::Text(text.into())).await {
            tracing::warn!(error = %e, "outbound send failed");
            self.teardown();
            let _ = self.events_tx.send(ConnEvent::Closed).await;
            self.schedule_retry();
        }
    }

    /// Closes the connection: `Closing`, then terminated.
    ///
    /// Pending reconnect timers are not cancelled; they re-validate
    /// session liveness before doing anything.
    pub async fn close(&mut self) {
        if self.state == ConnState::Disconnected {
            return;
        }
        self.state = ConnState::Closing;
        if let Some(mut sender) = self.ws_sender.take() {
            let _ = sender.send(Message::Close(None)).await;
            let _ = sender.close().await;
        }
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        self.state = ConnState::Disconnected;
        tracing::info!("gateway connection closed");
    }

    /// Reacts to a [`ConnEvent::Closed`] from the reader task.
    ///
    /// Ignored while closing or already disconnected (a local close tears
    /// the reader down itself).
    pub fn handle_closed(&mut self) {
        if matches!(self.state, ConnState::Closing | ConnState::Disconnected) {
            return;
        }
        tracing::warn!("gateway connection lost");
        self.teardown();
        self.schedule_retry();
    }

    /// Reacts to a [`ConnEvent::RetryDue`]: re-checks liveness and state,
    /// then attempts to open again.
    pub async fn handle_retry(&mut self) {
        if self.state != ConnState::Disconnected {
            return;
        }
        if !self.session.is_live() {
            tracing::debug!("retry due but session ended, staying disconnected");
            return;
        }
        self.open().await;
    }

    fn teardown(&mut self) {
        self.ws_sender = None;
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        self.state = ConnState::Disconnected;
    }

    /// Arms the single reconnect timer.
    ///
    /// The timer reads session identity when it fires, never now, and the
    /// atomic guard keeps at most one timer in flight per session.
    fn schedule_retry(&self) {
        if self.retry_pending.swap(true, Ordering::SeqCst) {
            tracing::debug!("reconnect already scheduled");
            return;
        }
        if !self.session.is_live() {
            // Nobody is logged in right now; a retry could only be armed
            // again by a later login, which opens directly anyway.
            self.retry_pending.store(false, Ordering::SeqCst);
            return;
        }
        let session = Arc::clone(&self.session);
        let pending = Arc::clone(&self.retry_pending);
        let events_tx = self.events_tx.clone();
        let delay = self.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::SeqCst);
            // Liveness is read here, at fire time.
            if session.is_live() {
                let _ = events_tx.send(ConnEvent::RetryDue).await;
            } else {
                tracing::debug!("reconnect timer fired after logout, dropping");
            }
        });
    }
}

/// Background task decoding inbound frames into [`ConnEvent::Inbound`].
///
/// Malformed frames are logged and skipped without interrupting the
/// stream. Emits [`ConnEvent::Closed`] once when the stream ends.
async fn reader_loop(mut ws_reader: WsReader, events_tx: mpsc::Sender<ConnEvent>) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match envelope::decode_server(text.as_str()) {
                Ok(msg) => {
                    if events_tx.send(ConnEvent::Inbound(msg)).await.is_err() {
                        // Engine dropped; stop reading.
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed inbound message, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("gateway closed the connection");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {
                // Protocol frames are text-only; everything else is noise.
            }
            Err(e) => {
                tracing::warn!(error = %e, "gateway read error");
                break;
            }
        }
    }
    let _ = events_tx.send(ConnEvent::Closed).await;
}
