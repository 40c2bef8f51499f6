//! In-process store for tests and embedding.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Snapshot, TaskStore};
use crate::error::StoreError;

/// Keeps the document in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            document: RwLock::new(snapshot),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        Ok(self.document.read().await.clone())
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        *self.document.write().await = snapshot.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_returns_copy() {
        let store = MemoryStore::new();
        let mut snapshot = store.read().await.unwrap();
        snapshot.wisdom_log.append("not written");
        assert!(store.read().await.unwrap().wisdom_log.is_empty());

        store.write(&snapshot).await.unwrap();
        assert_eq!(store.read().await.unwrap().wisdom_log.len(), 1);
    }
}
