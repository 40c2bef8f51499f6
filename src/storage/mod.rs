//! Durable document store.
//!
//! The store is the single source of truth for tasks, the approved stream,
//! wisdom, autopilot state and settings.
//!
//! # Overview
//!
//! - **[`TaskStore`]**: whole-document `read` / `write` backend trait
//! - **[`JsonFileStore`]**: one JSON file, replaced atomically
//! - **[`MemoryStore`]**: in-process backend for tests
//! - **[`StoreHandle`]**: serializes read-modify-write closures over a backend
//!
//! # Usage
//!
//! ```rust,ignore
//! use polyplex::storage::StoreHandle;
//!
//! let store = StoreHandle::json_file("./polyplex-db.json");
//! let removed = store
//!     .mutate(|doc| {
//!         let before = doc.tasks.len();
//!         doc.tasks.retain(|t| t.id != "task-1");
//!         before - doc.tasks.len()
//!     })
//!     .await?;
//! ```

pub mod document;
pub mod json_file;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::task::Task;

pub use document::Snapshot;
pub use json_file::{JsonFileStore, DEFAULT_STORE_PATH};
pub use memory::MemoryStore;

/// Backend holding the persisted document.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Read the whole document, healing malformed parts.
    async fn read(&self) -> Result<Snapshot, StoreError>;

    /// Replace the whole document.
    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Shared handle that serializes read-modify-write cycles.
///
/// The lock is only held for one read, one closure and one write; never
/// across a completion call.
#[derive(Clone)]
pub struct StoreHandle {
    backend: Arc<dyn TaskStore>,
    lock: Arc<Mutex<()>>,
}

impl StoreHandle {
    pub fn new(backend: Arc<dyn TaskStore>) -> Self {
        Self {
            backend,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileStore::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Consistent copy of the current document.
    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let _guard = self.lock.lock().await;
        self.backend.read().await
    }

    /// Apply one change to the document and persist it.
    pub async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> T + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.backend.read().await?;
        let output = change(&mut snapshot);
        self.backend.write(&snapshot).await?;
        Ok(output)
    }

    /// Like [`mutate`](Self::mutate), but nothing is written when the change fails.
    pub async fn try_mutate<T, E>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> Result<T, E> + Send,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.backend.read().await?;
        let output = change(&mut snapshot)?;
        self.backend.write(&snapshot).await?;
        Ok(output)
    }

    pub async fn find_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.snapshot().await?.find_task(id).cloned())
    }

    /// Change one task in place. Returns `None`, writing nothing, if the task is gone.
    pub async fn update_task<T>(
        &self,
        id: &str,
        change: impl FnOnce(&mut Task) -> T + Send,
    ) -> Result<Option<T>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.backend.read().await?;
        let Some(task) = snapshot.find_task_mut(id) else {
            return Ok(None);
        };
        let output = change(task);
        self.backend.write(&snapshot).await?;
        Ok(Some(output))
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}
