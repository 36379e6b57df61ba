//! Gateway server core: shared state, WebSocket handler, and event fan-out.
//!
//! The gateway accepts WebSocket connections, answers `load_tasks` with the
//! full collection, applies mutations to the authoritative list, and
//! broadcasts the resulting event to every connected client. The sender
//! receives its own mutations back as echoes; clients rely on merge
//! idempotence to absorb them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use tasksync_proto::envelope::{self, ClientMessage, ServerMessage};
use tasksync_proto::task::TaskRecord;

/// Shared gateway state holding the task collection and client registry.
pub struct GatewayState {
    /// The authoritative task list, in insertion order.
    tasks: RwLock<Vec<TaskRecord>>,
    /// Maps client id to a channel sender for delivering WebSocket messages.
    clients: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    /// Monotonic client id source.
    next_client_id: AtomicU64,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayState {
    /// Creates a new gateway state with no tasks and no clients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Registers a client, returning its assigned id.
    async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, sender);
        id
    }

    /// Removes a client from the registry.
    async fn unregister(&self, client_id: u64) {
        self.clients.write().await.remove(&client_id);
    }

    /// Number of currently connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Snapshot of the authoritative task list.
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.tasks.read().await.clone()
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each client's writer task sends the close frame, which the client
    /// reader detects as a disconnect. Useful for graceful shutdown and
    /// testing reconnect behavior.
    pub async fn close_all_connections(&self) {
        let clients = self.clients.read().await;
        for (client_id, sender) in clients.iter() {
            tracing::info!(client_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }

    /// Broadcasts an event to every connected client, the sender included.
    async fn broadcast(&self, event: &ServerMessage) {
        let text = match envelope::encode_server(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast event");
                return;
            }
        };
        let clients = self.clients.read().await;
        for sender in clients.values() {
            let _ = sender.send(Message::Text(text.clone().into()));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register the client in the fan-out registry.
/// 2. Spawn a writer task draining the client's channel.
/// 3. Enter the reader loop, applying requests to the shared state.
/// 4. On disconnect, unregister the client.
pub async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client_id = state.register(tx).await;
    tracing::info!(client_id, "client connected");

    // Writer task: forward channel messages to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!("WebSocket write failed");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    // Reader loop: process requests from this client.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_request(client_id, text.as_str(), &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(client_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(client_id).await;
    tracing::info!(client_id, "client disconnected and unregistered");
}

/// Handles one text request from a connected client.
async fn handle_request(client_id: u64, text: &str, state: &Arc<GatewayState>) {
    let request = match envelope::decode_client(text) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(client_id, error = %e, "failed to decode request");
            send_to_client(
                state,
                client_id,
                &ServerMessage::Error {
                    message: format!("malformed request: {e}"),
                },
            )
            .await;
            return;
        }
    };

    match request {
        ClientMessage::LoadTasks => {
            let tasks = state.tasks().await;
            tracing::debug!(client_id, count = tasks.len(), "serving full load");
            send_to_client(state, client_id, &ServerMessage::TasksLoaded { tasks }).await;
        }
        ClientMessage::AddTask { task } => {
            {
                let mut tasks = state.tasks.write().await;
                // A re-sent id replaces the stored record.
                if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
                    *existing = task.clone();
                } else {
                    tasks.push(task.clone());
                }
            }
            tracing::info!(client_id, task_id = %task.id, "task added");
            state.broadcast(&ServerMessage::TaskAdded { task }).await;
        }
        ClientMessage::UpdateTask { task_id, updates } => {
            {
                let mut tasks = state.tasks.write().await;
                if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                    updates.apply_to(task);
                } else {
                    tracing::debug!(client_id, task_id = %task_id, "update for unknown task");
                }
            }
            // Broadcast regardless; clients drop unknown ids themselves.
            state
                .broadcast(&ServerMessage::TaskUpdated { task_id, updates })
                .await;
        }
        ClientMessage::DeleteTask { task_id } => {
            state.tasks.write().await.retain(|t| t.id != task_id);
            tracing::info!(client_id, task_id = %task_id, "task deleted");
            state
                .broadcast(&ServerMessage::TaskDeleted { task_id })
                .await;
        }
    }
}

/// Sends an event to one registered client via its channel.
async fn send_to_client(state: &Arc<GatewayState>, client_id: u64, event: &ServerMessage) {
    if let Some(sender) = state.clients.read().await.get(&client_id)
        && let Ok(text) = envelope::encode_server(event)
    {
        let _ = sender.send(Message::Text(text.into()));
    }
}

/// Starts the gateway server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(GatewayState::new())).await
}

/// Starts the gateway server with a pre-configured [`GatewayState`].
///
/// Tests use this to keep a handle on the state for inspection and for
/// [`GatewayState::close_all_connections`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<GatewayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "gateway server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<GatewayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
