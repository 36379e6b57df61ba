//! JSON message envelope exchanged with the sync gateway.
//!
//! Outbound messages are tagged by `action`, inbound by `type`, matching
//! the gateway's native shape. Frames are UTF-8 JSON text. Anything that
//! does not decode into one of the known variants is a malformed message
//! and must be skipped by the receiver, never treated as fatal.

use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskRecord, TaskUpdates};

/// Error type for envelope encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serialization or deserialization failed.
    #[error("wire format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Messages sent from the engine to the sync gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the server's full record set.
    LoadTasks,
    /// Announce a locally created task.
    AddTask {
        /// The new record.
        task: TaskRecord,
    },
    /// Announce a partial update to a task.
    UpdateTask {
        /// Which task changed.
        task_id: TaskId,
        /// The changed fields.
        updates: TaskUpdates,
    },
    /// Announce a task deletion.
    DeleteTask {
        /// Which task was removed.
        task_id: TaskId,
    },
}

/// Messages pushed from the sync gateway to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full server record set, answering a `load_tasks` request.
    TasksLoaded {
        /// Every record the server knows.
        tasks: Vec<TaskRecord>,
    },
    /// A task was added elsewhere (or our own add echoed back).
    TaskAdded {
        /// The added record.
        task: TaskRecord,
    },
    /// A task was partially updated elsewhere.
    TaskUpdated {
        /// Which task changed.
        task_id: TaskId,
        /// The changed fields.
        #[serde(default)]
        updates: TaskUpdates,
    },
    /// A task was deleted elsewhere.
    TaskDeleted {
        /// Which task was removed.
        task_id: TaskId,
    },
    /// The server reported a failure. Never rolls back local state.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Encodes a [`ClientMessage`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`WireError::Format`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<String, WireError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a [`ClientMessage`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`WireError::Format`] for unknown actions or malformed JSON.
pub fn decode_client(text: &str) -> Result<ClientMessage, WireError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a [`ServerMessage`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`WireError::Format`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<String, WireError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a [`ServerMessage`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`WireError::Format`] for unknown types or malformed JSON.
pub fn decode_server(text: &str) -> Result<ServerMessage, WireError> {
    Ok(serde_json::from_str(text)?)
}
