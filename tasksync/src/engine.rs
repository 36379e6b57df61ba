//! The sync engine: a single task owning the working set.
//!
//! Callers drive the engine through [`Command`]s and drain [`EngineEvent`]s;
//! the engine drives the [`ConnectionManager`] and the [`TaskStore`]:
//!
//! ```text
//! caller (CLI / tests)  ←── EngineEvent ───  engine task  ←── ConnEvent ─── reader / timers
//!                        ─── Command ──→                  ─── WebSocket ──→ gateway
//! ```
//!
//! Exactly one task mutates the working set, so local mutations and
//! inbound server events are applied sequentially and can never interleave
//! mid-merge. Each mutation follows the same sequence: apply locally,
//! persist, notify, transmit. Persistence hands the store a clone of the
//! working set taken at that point in the sequence, so a later mutation
//! cannot leak into an in-flight write.

use std::sync::Arc;

use tokio::sync::mpsc;

use tasksync_proto::envelope::{ClientMessage, ServerMessage};
use tasksync_proto::task::{TaskId, TaskRecord};

use crate::conn::{self, ConnEvent, ConnectionManager};
use crate::dispatch::{AddIntent, CommandDispatcher};
use crate::reconcile;
use crate::session::Session;
use crate::store::{StoreError, TaskStore};

/// Commands sent from the caller to the engine task.
#[derive(Debug)]
pub enum Command {
    /// Start a session under the given identity and connect.
    Login {
        /// Display name to act as.
        name: String,
    },
    /// End the session, disconnect, and clear the working set.
    Logout,
    /// Create a task.
    Add(AddIntent),
    /// Flip a task between pending and completed.
    Toggle(TaskId),
    /// Delete a task.
    Remove(TaskId),
    /// Stop the engine task.
    Shutdown,
}

/// Events sent from the engine task to the caller.
#[derive(Debug)]
pub enum EngineEvent {
    /// The working set changed; carries the full ordered snapshot.
    TasksChanged(Vec<TaskRecord>),
    /// A session began.
    SessionStarted {
        /// The identity now in effect.
        name: String,
    },
    /// A persisted identity was found at startup. Purely a suggestion;
    /// the session starts only on an explicit login.
    IdentitySuggested {
        /// The previously used identity.
        name: String,
    },
    /// The session ended.
    SessionEnded,
    /// Connection status update.
    ConnectionStatus {
        /// Whether the gateway link is currently open.
        connected: bool,
    },
    /// A local command was rejected before touching any state.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// The gateway reported an application-level error.
    ServerError {
        /// The gateway's error text.
        message: String,
    },
    /// Durable storage failed; the engine continues memory-only.
    StorageUnavailable {
        /// What went wrong.
        reason: String,
    },
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WebSocket URL of the sync gateway (e.g. `ws://127.0.0.1:9100/ws`).
    pub gateway_url: String,
    /// Timeout for the connect handshake.
    pub connect_timeout: std::time::Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: std::time::Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

/// Default channel capacity for commands and events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl EngineConfig {
    /// Creates an `EngineConfig` with the standard timings.
    #[must_use]
    pub const fn new(gateway_url: String) -> Self {
        Self {
            gateway_url,
            connect_timeout: conn::CONNECT_TIMEOUT,
            reconnect_delay: conn::RECONNECT_DELAY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Spawns the engine task and returns its channel handles.
///
/// Initializes the store, surfaces a persisted identity as
/// [`EngineEvent::IdentitySuggested`] if one exists, and starts the
/// command loop. The engine never requires the gateway to be reachable
/// and never connects on its own; the connection opens on login.
pub async fn spawn_engine<S>(
    config: EngineConfig,
    store: S,
) -> (mpsc::Sender<Command>, mpsc::Receiver<EngineEvent>)
where
    S: TaskStore + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<EngineEvent>(config.channel_capacity);
    let (conn_tx, conn_rx) = mpsc::channel::<ConnEvent>(config.channel_capacity);

    let session = Arc::new(Session::new());
    let conn = ConnectionManager::new(
        config.gateway_url.clone(),
        config.connect_timeout,
        config.reconnect_delay,
        Arc::clone(&session),
        conn_tx,
    );

    let mut engine = Engine {
        store,
        session: Arc::clone(&session),
        dispatcher: CommandDispatcher::new(session),
        conn,
        working: Vec::new(),
        evt_tx,
        store_ok: true,
    };

    tokio::spawn(async move {
        engine.start().await;
        engine.run(cmd_rx, conn_rx).await;
    });

    (cmd_tx, evt_rx)
}

struct Engine<S> {
    store: S,
    session: Arc<Session>,
    dispatcher: CommandDispatcher,
    conn: ConnectionManager,
    /// The ordered working set, newest first. Only this task touches it.
    working: Vec<TaskRecord>,
    evt_tx: mpsc::Sender<EngineEvent>,
    /// Cleared on the first storage failure; later writes are skipped.
    store_ok: bool,
}

impl<S: TaskStore> Engine<S> {
    /// Startup: open the store and surface any persisted identity.
    ///
    /// The persisted identity is a suggestion only; no session or
    /// connection is established until an explicit login.
    async fn start(&mut self) {
        if let Err(e) = self.store.initialize().await {
            self.storage_degraded(&e).await;
        }
        if !self.store_ok {
            return;
        }
        match self.store.load_identity().await {
            Ok(Some(name)) => {
                tracing::info!(name = %name, "found persisted identity");
                self.emit(EngineEvent::IdentitySuggested { name }).await;
            }
            Ok(None) => {}
            Err(e) => self.storage_degraded(&e).await,
        }
    }

    async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut conn_rx: mpsc::Receiver<ConnEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                Some(event) = conn_rx.recv() => {
                    self.handle_conn_event(event).await;
                }
            }
        }
        self.conn.close().await;
        tracing::info!("engine shut down");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Login { name } => {
                if name.trim().is_empty() {
                    self.emit(EngineEvent::Rejected {
                        reason: "name cannot be empty".to_string(),
                    })
                    .await;
                    return;
                }
                let name = name.trim().to_string();
                if self.store_ok
                    && let Err(e) = self.store.save_identity(&name).await
                {
                    self.storage_degraded(&e).await;
                }
                self.begin_session(name).await;
            }
            Command::Logout => {
                self.conn.close().await;
                self.session.logout();
                if self.store_ok
                    && let Err(e) = self.store.save_identity("").await
                {
                    self.storage_degraded(&e).await;
                }
                // Cached tasks stay on disk for the next login; only the
                // in-memory view is dropped.
                self.working.clear();
                self.emit(EngineEvent::ConnectionStatus { connected: false })
                    .await;
                self.emit(EngineEvent::SessionEnded).await;
                self.notify_tasks().await;
            }
            Command::Add(intent) => match self.dispatcher.add(&mut self.working, intent) {
                Ok((_record, msg)) => {
                    self.persist_snapshot().await;
                    self.notify_tasks().await;
                    self.conn.send(&msg).await;
                }
                Err(e) => {
                    self.emit(EngineEvent::Rejected {
                        reason: e.to_string(),
                    })
                    .await;
                }
            },
            Command::Toggle(id) => {
                if let Some(msg) = self.dispatcher.toggle(&mut self.working, &id) {
                    self.persist_snapshot().await;
                    self.notify_tasks().await;
                    self.conn.send(&msg).await;
                } else {
                    tracing::debug!(id = %id, "toggle for unknown task ignored");
                }
            }
            Command::Remove(id) => {
                let msg = self.dispatcher.remove(&mut self.working, &id);
                if self.store_ok
                    && let Err(e) = self.store.delete_one(&id).await
                {
                    self.storage_degraded(&e).await;
                }
                self.notify_tasks().await;
                self.conn.send(&msg).await;
            }
            Command::Shutdown => unreachable!("handled in run"),
        }
    }

    async fn handle_conn_event(&mut self, event: ConnEvent) {
        match event {
            ConnEvent::Ready => {
                self.emit(EngineEvent::ConnectionStatus { connected: true })
                    .await;
                // A fresh connection always starts with a full load.
                self.conn.send(&ClientMessage::LoadTasks).await;
            }
            ConnEvent::Inbound(msg) => self.handle_server_message(msg).await,
            ConnEvent::Closed => {
                self.conn.handle_closed();
                self.emit(EngineEvent::ConnectionStatus { connected: false })
                    .await;
            }
            ConnEvent::RetryDue => self.conn.handle_retry().await,
        }
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) {
        if let ServerMessage::Error { message } = msg {
            tracing::warn!(message = %message, "gateway error");
            self.emit(EngineEvent::ServerError { message }).await;
            return;
        }
        let deleted_id = match &msg {
            ServerMessage::TaskDeleted { task_id } => Some(task_id.clone()),
            _ => None,
        };
        if !reconcile::apply_event(&mut self.working, &msg) {
            return;
        }
        // Deletes get a targeted removal; everything else rewrites the
        // snapshot taken here.
        if let Some(id) = deleted_id {
            if self.store_ok
                && let Err(e) = self.store.delete_one(&id).await
            {
                self.storage_degraded(&e).await;
            }
        } else {
            self.persist_snapshot().await;
        }
        self.notify_tasks().await;
    }

    /// Enters a session: identity, cached tasks, then the network.
    async fn begin_session(&mut self, name: String) {
        self.session.login(&name);
        if self.store_ok {
            match self.store.load_all().await {
                Ok(cached) => self.working = cached,
                Err(e) => self.storage_degraded(&e).await,
            }
        }
        tracing::debug!(tasks = self.working.len(), "session begins with cached working set");
        self.emit(EngineEvent::SessionStarted { name }).await;
        self.notify_tasks().await;
        self.conn.open().await;
    }

    /// Persists a clone of the working set taken at this point.
    async fn persist_snapshot(&mut self) {
        if !self.store_ok {
            return;
        }
        let snapshot = self.working.clone();
        if let Err(e) = self.store.replace_all(snapshot).await {
            self.storage_degraded(&e).await;
        }
    }

    /// Degrades to memory-only operation after a storage failure.
    async fn storage_degraded(&mut self, error: &StoreError) {
        if !self.store_ok {
            return;
        }
        tracing::warn!(error = %error, "durable storage failed, continuing memory-only");
        self.store_ok = false;
        self.emit(EngineEvent::StorageUnavailable {
            reason: error.to_string(),
        })
        .await;
    }

    async fn notify_tasks(&self) {
        self.emit(EngineEvent::TasksChanged(self.working.clone()))
            .await;
    }

    async fn emit(&self, event: EngineEvent) {
        if self.evt_tx.send(event).await.is_err() {
            tracing::debug!("caller dropped the event receiver");
        }
    }
}
