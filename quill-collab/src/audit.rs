//! Append-only audit log of every committed delta.
//!
//! `LOG?` answers with the concatenation of every delta block ever
//! produced, so the log is kept as one growing string. Rejected commands
//! appear too; consuming a log line is part of processing a command.

use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<String>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one rendered delta block.
    pub async fn append(&self, delta: &str) {
        self.records.lock().await.push_str(delta);
    }

    /// The whole log, for `LOG?`.
    pub async fn contents(&self) -> String {
        self.records.lock().await.clone()
    }

    /// Total logged bytes.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
