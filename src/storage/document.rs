//! The whole persisted document and its tolerant decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::scheduler::OrchestratorState;
use crate::task::{Settings, StreamEntry, Task, WisdomMemory};

/// Everything the system persists, read and written as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    /// Approved entries, most recent first.
    pub stream: Vec<StreamEntry>,
    pub wisdom_log: WisdomMemory,
    pub orchestrator: OrchestratorState,
    pub settings: Settings,
}

impl Snapshot {
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Tasks counted against the autopilot concurrency cap.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_active()).count()
    }

    /// Decode a document, healing what can be healed.
    ///
    /// Missing fields take defaults. A malformed top-level field falls back
    /// to its default, and individual malformed tasks or stream entries are
    /// dropped. Each repair is logged at warn level.
    pub fn from_json(raw: &str, path: &str) -> Result<Self, StoreError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let Value::Object(mut root) = value else {
            return Err(StoreError::Corrupt {
                path: path.to_string(),
                message: "top-level value is not an object".to_string(),
            });
        };

        Ok(Self {
            tasks: decode_items(root.remove("tasks"), "tasks"),
            stream: decode_items(root.remove("stream"), "stream"),
            wisdom_log: decode_field(root.remove("wisdomLog"), "wisdomLog"),
            orchestrator: decode_field(root.remove("orchestrator"), "orchestrator"),
            settings: decode_field(root.remove("settings"), "settings"),
        })
    }
}

fn decode_field<T: serde::de::DeserializeOwned + Default>(value: Option<Value>, field: &str) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            tracing::warn!(field = field, error = %e, "Dropping malformed document field");
            T::default()
        }),
    }
}

fn decode_items<T: serde::de::DeserializeOwned>(value: Option<Value>, field: &str) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::warn!(field = field, index = index, error = %e, "Dropping malformed entry");
                    None
                }
            })
            .collect(),
        Some(_) => {
            tracing::warn!(field = field, "Expected an array, using empty list");
            Vec::new()
        }
    }
}
