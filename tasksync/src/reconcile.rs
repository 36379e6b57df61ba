//! Merge rules folding inbound server events into the working set.
//!
//! Pure functions over `Vec<TaskRecord>`; the engine persists after any
//! fold that reports a change. Every rule is idempotent under replay:
//! applying the same event to a working set that already reflects it
//! changes nothing, which makes out-of-order and duplicated delivery
//! harmless.

use tasksync_proto::envelope::ServerMessage;
use tasksync_proto::task::{TaskId, TaskRecord, TaskUpdates};

/// Folds one inbound event into the working set.
///
/// Exhaustive over the five known event kinds. `error` events never touch
/// task state (they surface to the caller separately). Returns `true` if
/// the working set changed.
pub fn apply_event(working: &mut Vec<TaskRecord>, event: &ServerMessage) -> bool {
    match event {
        ServerMessage::TasksLoaded { tasks } => merge_full_load(working, tasks),
        ServerMessage::TaskAdded { task } => apply_insert(working, task),
        ServerMessage::TaskUpdated { task_id, updates } => {
            apply_update(working, task_id, updates)
        }
        ServerMessage::TaskDeleted { task_id } => apply_delete(working, task_id),
        ServerMessage::Error { .. } => false,
    }
}

/// Full-load merge: working ∪ (server \ ids(working)).
///
/// Local records always win on id collision, so offline and in-flight
/// local edits survive a reload. Server-only records append, keeping
/// local newest-first ordering for everything the user touched.
pub fn merge_full_load(working: &mut Vec<TaskRecord>, server: &[TaskRecord]) -> bool {
    let mut changed = false;
    for record in server {
        if !contains(working, &record.id) {
            working.push(record.clone());
            changed = true;
        }
    }
    changed
}

/// Insert rule: no-op when the id is already present (a local optimistic
/// insert may have beaten the echo), otherwise prepend.
pub fn apply_insert(working: &mut Vec<TaskRecord>, task: &TaskRecord) -> bool {
    if contains(working, &task.id) {
        return false;
    }
    working.insert(0, task.clone());
    true
}

/// Partial-update rule: shallow-merge fields into the matching record.
///
/// An unknown id is silently dropped — stale or out-of-order events are
/// expected, not errors.
pub fn apply_update(working: &mut [TaskRecord], id: &TaskId, updates: &TaskUpdates) -> bool {
    match working.iter_mut().find(|r| r.id == *id) {
        Some(record) => updates.apply_to(record),
        None => {
            tracing::debug!(task_id = %id, "update for unknown task dropped");
            false
        }
    }
}

/// Delete rule: remove if present; idempotent.
pub fn apply_delete(working: &mut Vec<TaskRecord>, id: &TaskId) -> bool {
    let before = working.len();
    working.retain(|r| r.id != *id);
    working.len() != before
}

fn contains(working: &[TaskRecord], id: &TaskId) -> bool {
    working.iter().any(|r| r.id == *id)
}
