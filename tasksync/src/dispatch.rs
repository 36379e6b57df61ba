//! Command dispatcher: user intents become optimistic local mutations
//! plus best-effort outbound messages.
//!
//! All three operations are optimistic-local-first: the working set
//! changes before any server acknowledgment, and no rollback exists —
//! correction only ever arrives through later inbound events.

use std::sync::Arc;

use tasksync_proto::envelope::ClientMessage;
use tasksync_proto::task::{
    MAX_TASK_TITLE_LENGTH, Priority, TaskId, TaskRecord, TaskStatus, TaskUpdates,
};

use crate::reconcile;
use crate::session::Session;

/// Errors rejecting a user intent before it touches any state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
}

/// A user's request to create a task.
#[derive(Debug, Clone, Default)]
pub struct AddIntent {
    /// Title of the new task.
    pub title: String,
    /// Assignee; empty defaults to the creating identity.
    pub assignee: String,
    /// Priority; defaults to medium.
    pub priority: Priority,
    /// Optional ISO-8601 due date.
    pub due_date: Option<String>,
}

impl AddIntent {
    /// Intent with just a title, everything else defaulted.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Turns intents into working-set mutations and outbound messages.
///
/// Holds the shared [`Session`] so `createdBy` and the assignee default
/// always reflect the identity current at dispatch time.
pub struct CommandDispatcher {
    session: Arc<Session>,
}

impl CommandDispatcher {
    /// Creates a dispatcher bound to the given session context.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Creates a record from `intent`, prepends it to the working set,
    /// and returns it with the `add_task` message to transmit.
    ///
    /// The id is a freshly minted UUID v7, so it is unique even while
    /// offline. The local copy stands as truth until a later full-load
    /// corrects it; a failed or rejected transmission is never rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::TitleEmpty`] or
    /// [`DispatchError::TitleTooLong`] without touching the working set.
    pub fn add(
        &self,
        working: &mut Vec<TaskRecord>,
        intent: AddIntent,
    ) -> Result<(TaskRecord, ClientMessage), DispatchError> {
        if intent.title.is_empty() {
            return Err(DispatchError::TitleEmpty);
        }
        if intent.title.chars().count() > MAX_TASK_TITLE_LENGTH {
            return Err(DispatchError::TitleTooLong);
        }

        let creator = self.session.identity().unwrap_or_default();
        let assignee = if intent.assignee.is_empty() {
            creator.clone()
        } else {
            intent.assignee
        };
        let record = TaskRecord {
            id: TaskId::generate(),
            title: intent.title,
            status: TaskStatus::Pending,
            assignee,
            priority: intent.priority,
            due_date: intent.due_date,
            created_by: creator,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        reconcile::apply_insert(working, &record);
        let msg = ClientMessage::AddTask {
            task: record.clone(),
        };
        Ok((record, msg))
    }

    /// Flips pending ↔ completed on the matching record.
    ///
    /// Returns the `update_task` message to transmit, or `None` when the
    /// id is unknown — in which case nothing changed and nothing should
    /// be persisted or sent.
    pub fn toggle(
        &self,
        working: &mut [TaskRecord],
        id: &TaskId,
    ) -> Option<ClientMessage> {
        let record = working.iter_mut().find(|r| r.id == *id)?;
        record.status = record.status.toggled();
        Some(ClientMessage::UpdateTask {
            task_id: id.clone(),
            updates: TaskUpdates::status(record.status),
        })
    }

    /// Applies the delete rule and returns the `delete_task` message.
    ///
    /// The message is produced even when the id was already absent;
    /// deletion is idempotent on both ends.
    pub fn remove(&self, working: &mut Vec<TaskRecord>, id: &TaskId) -> ClientMessage {
        reconcile::apply_delete(working, id);
        ClientMessage::DeleteTask {
            task_id: id.clone(),
        }
    }
}
