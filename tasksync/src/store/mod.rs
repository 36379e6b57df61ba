//! Durable local cache for task records.
//!
//! Defines the [`TaskStore`] trait plus two implementations:
//! [`MemoryStore`] for tests and degraded memory-only operation, and
//! [`file::JsonFileStore`] for real durable storage.
//!
//! The store is a mirror of the last successfully persisted working set,
//! never an independent authority. Any storage failure surfaces as a
//! [`StoreError`] that callers treat as non-fatal: the engine keeps
//! operating memory-only rather than aborting.

pub mod file;

use std::sync::Arc;

use tokio::sync::Mutex;

use tasksync_proto::task::{TaskId, TaskRecord};

pub use file::JsonFileStore;

/// Errors that can occur during local store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage layer could not be opened or is gone.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Trait for the durable, id-keyed task cache plus the single identity slot.
///
/// Every call is a suspension point for the engine task; implementations
/// must therefore receive value snapshots (note that [`replace_all`]
/// takes the records by value, fixed at call time) so an interleaved
/// mutation of the working set can never be half-persisted.
///
/// [`replace_all`]: TaskStore::replace_all
pub trait TaskStore: Send + Sync {
    /// Opens the store. Idempotent; concurrent callers observe one shared
    /// initialization outcome.
    fn initialize(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Atomic full replacement: clear then insert. Either every record is
    /// persisted or the call fails as a unit. An empty input leaves the
    /// store empty.
    fn replace_all(
        &self,
        records: Vec<TaskRecord>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Returns every record; an empty vec (never an error) for an empty
    /// store. Ordering is consistent with the last successful
    /// [`replace_all`](TaskStore::replace_all).
    fn load_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<TaskRecord>, StoreError>> + Send;

    /// Removes a record if present; success if absent.
    fn delete_one(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Persists the session identity to its own durable slot, outside the
    /// task collection. An empty name clears the slot.
    fn save_identity(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Loads the previously persisted identity, if any.
    fn load_identity(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<String>, StoreError>> + Send;
}

/// Stores are commonly shared between the engine and tests via `Arc`.
impl<S: TaskStore> TaskStore for Arc<S> {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.as_ref().initialize().await
    }

    async fn replace_all(&self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        self.as_ref().replace_all(records).await
    }

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.as_ref().load_all().await
    }

    async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError> {
        self.as_ref().delete_one(id).await
    }

    async fn save_identity(&self, name: &str) -> Result<(), StoreError> {
        self.as_ref().save_identity(name).await
    }

    async fn load_identity(&self) -> Result<Option<String>, StoreError> {
        self.as_ref().load_identity().await
    }
}

/// In-memory implementation of [`TaskStore`].
///
/// Used by tests and as the fallback when durable storage is unavailable.
/// Keeps records in the order of the last `replace_all` so `load_all`
/// ordering matches the durable implementation's behavior.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TaskRecord>>,
    identity: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn replace_all(&self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        *self.records.lock().await = records;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }

    async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError> {
        self.records.lock().await.retain(|r| r.id != *id);
        Ok(())
    }

    async fn save_identity(&self, name: &str) -> Result<(), StoreError> {
        let slot = (!name.is_empty()).then(|| name.to_string());
        *self.identity.lock().await = slot;
        Ok(())
    }

    async fn load_identity(&self) -> Result<Option<String>, StoreError> {
        Ok(self.identity.lock().await.clone())
    }
}
