//! Task record model shared by the engine, the local store, and the wire.
//!
//! Field names serialize as camelCase because the authoritative store's
//! gateway speaks the original JSON shape (`dueDate`, `createdBy`, ...).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task.
///
/// Client-generated from a UUID v7, so ids are time-ordered and collision
/// free across offline clients. Kept as an opaque string on the wire —
/// the engine never assumes anything about ids minted elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Mints a new time-ordered task identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task has not been completed yet.
    Pending,
    /// Task has been completed.
    Completed,
}

impl TaskStatus {
    /// Returns the opposite status.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Priority of a task. Defaults to [`Priority::Medium`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority (the default).
    #[default]
    Medium,
    /// High priority.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A single task record.
///
/// The id is unique within any working set. `created_at` and `due_date`
/// are ISO-8601 strings; the engine treats both as opaque (only the
/// authoritative store interprets due dates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique, client-generated identifier.
    pub id: TaskId,
    /// Human-readable title.
    pub title: String,
    /// Completion state.
    pub status: TaskStatus,
    /// Identity the task is assigned to.
    pub assignee: String,
    /// Priority level.
    #[serde(default)]
    pub priority: Priority,
    /// Optional ISO-8601 due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Identity that created the task.
    pub created_by: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
}

/// Partial-field update for a task.
///
/// Absent fields are left untouched when applied (shallow merge), so an
/// `update_task` message only carries what actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskUpdates {
    /// New title, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New status, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New assignee, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// New priority, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New due date, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl TaskUpdates {
    /// Builds an update that only changes the status.
    #[must_use]
    pub const fn status(status: TaskStatus) -> Self {
        Self {
            title: None,
            status: Some(status),
            assignee: None,
            priority: None,
            due_date: None,
        }
    }

    /// Returns `true` when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    /// Shallow-merges the set fields into `record`.
    ///
    /// Returns `true` if any field actually changed value, which makes
    /// replayed updates detectable as no-ops.
    pub fn apply_to(&self, record: &mut TaskRecord) -> bool {
        let mut changed = false;
        if let Some(title) = &self.title
            && record.title != *title
        {
            record.title = title.clone();
            changed = true;
        }
        if let Some(status) = self.status
            && record.status != status
        {
            record.status = status;
            changed = true;
        }
        if let Some(assignee) = &self.assignee
            && record.assignee != *assignee
        {
            record.assignee = assignee.clone();
            changed = true;
        }
        if let Some(priority) = self.priority
            && record.priority != priority
        {
            record.priority = priority;
            changed = true;
        }
        if let Some(due_date) = &self.due_date
            && record.due_date.as_deref() != Some(due_date)
        {
            record.due_date = Some(due_date.clone());
            changed = true;
        }
        changed
    }
}
