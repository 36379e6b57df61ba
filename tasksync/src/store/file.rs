//! JSON-file-backed durable store.
//!
//! Two artifacts under one data directory: `tasks.json` (the id-keyed task
//! collection, stored as an ordered array) and `identity` (the single
//! session identity slot). Writes go to a temp file which is renamed over
//! the target, so `replace_all` is atomic: either every record lands or
//! the previous file survives intact.

use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;

use tasksync_proto::task::{TaskId, TaskRecord};

use super::{StoreError, TaskStore};

/// Durable [`TaskStore`] persisting to JSON files under a data directory.
#[derive(Debug)]
pub struct JsonFileStore {
    /// Directory holding `tasks.json` and `identity`.
    data_dir: PathBuf,
    /// Shared initialization outcome; opening is idempotent.
    init: OnceCell<()>,
}

impl JsonFileStore {
    /// Creates a store rooted at `data_dir`. Nothing touches the disk
    /// until [`TaskStore::initialize`] runs.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            init: OnceCell::new(),
        }
    }

    fn tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity")
    }

    /// Writes `bytes` to `path` atomically via a sibling temp file.
    async fn write_atomic(&self, path: &Path, bytes: Vec<u8>) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("{}: {e}", path.display())))
    }

    async fn read_records(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let path = self.tasks_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::ReadFailed(format!("{}: {e}", path.display())));
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::ReadFailed(format!("{}: {e}", path.display())))
    }
}

impl TaskStore for JsonFileStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.init
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
                    StoreError::Unavailable(format!("{}: {e}", self.data_dir.display()))
                })
            })
            .await?;
        Ok(())
    }

    async fn replace_all(&self, records: Vec<TaskRecord>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.write_atomic(&self.tasks_path(), bytes).await
    }

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.read_records().await
    }

    async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut records = self.read_records().await?;
        let before = records.len();
        records.retain(|r| r.id != *id);
        if records.len() == before {
            // Absent id is a success, and nothing needs rewriting.
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.write_atomic(&self.tasks_path(), bytes).await
    }

    async fn save_identity(&self, name: &str) -> Result<(), StoreError> {
        self.write_atomic(&self.identity_path(), name.as_bytes().to_vec())
            .await
    }

    async fn load_identity(&self) -> Result<Option<String>, StoreError> {
        let path = self.identity_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(name) if name.trim().is_empty() => Ok(None),
            Ok(name) => Ok(Some(name.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadFailed(format!("{}: {e}", path.display()))),
        }
    }
}
