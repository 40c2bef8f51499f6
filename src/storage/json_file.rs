//! Single JSON document on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{Snapshot, TaskStore};
use crate::error::StoreError;

/// Default document location, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = "./polyplex-db.json";

/// Stores the whole [`Snapshot`] as one pretty-printed JSON file.
///
/// A missing file reads as an empty document. Writes go to a sibling
/// temporary file which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "polyplex-db.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Snapshot::from_json(&raw, &self.path.display().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp = self.temp_path();
        fs::write(&temp, body).await.map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::trace!(path = %self.path.display(), "Document written");
        Ok(())
    }
}
