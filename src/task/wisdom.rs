//! Append-only memory of rejection feedback.

use serde::{Deserialize, Serialize};

/// Lessons learned from rejected tasks, oldest first.
///
/// Entries are never deduplicated or expired; readers always go through
/// [`WisdomMemory::recent`] so prompts stay bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WisdomMemory(Vec<String>);

impl WisdomMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record feedback verbatim. Blank feedback is ignored; returns whether it was stored.
    pub fn append(&mut self, feedback: &str) -> bool {
        if feedback.trim().is_empty() {
            return false;
        }
        self.0.push(feedback.to_string());
        true
    }

    /// The most recent `n` entries, most recent last.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let start = self.0.len().saturating_sub(n);
        self.0[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for WisdomMemory {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}
