//! FIFO command queue shared by every producer.
//!
//! Session tasks and the operator console enqueue; the batch loop is the
//! single consumer and detaches the whole queue in one operation per
//! tick, so arrival order is exactly apply order.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::Mutex;

/// One queued command: who sent it, the raw line, and when it arrived.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub user: String,
    pub line: String,
    /// Baseline version the submitter targeted. `None` applies at the
    /// version current when the batch runs, which is what the session
    /// path always uses; an explicit stale version is rejected as
    /// `OUTDATED_VERSION`.
    pub version: Option<u64>,
    pub queued_at: Instant,
}

impl QueuedCommand {
    pub fn new(user: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            line: line.into(),
            version: None,
            queued_at: Instant::now(),
        }
    }

    /// A record pinned to an explicit baseline version.
    pub fn targeting(user: impl Into<String>, line: impl Into<String>, version: u64) -> Self {
        Self {
            version: Some(version),
            ..Self::new(user, line)
        }
    }
}

/// Capacity-bounded FIFO. `enqueue` reports back-pressure instead of
/// silently dropping when the bound is hit.
pub struct CommandQueue {
    inner: Mutex<VecDeque<QueuedCommand>>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Appends a record. Returns `false` when the queue is full; the
    /// command is dropped and the caller decides how loudly to complain.
    pub async fn enqueue(&self, user: impl Into<String>, line: impl Into<String>) -> bool {
        let mut queue = self.inner.lock().await;
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(QueuedCommand::new(user, line));
        true
    }

    /// Detaches and returns everything queued so far, in arrival order.
    pub async fn drain(&self) -> Vec<QueuedCommand> {
        let mut queue = self.inner.lock().await;
        std::mem::take(&mut *queue).into()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_in_arrival_order() {
        let queue = CommandQueue::new(16);
        assert!(queue.enqueue("alice", "INSERT 0 a").await);
        assert!(queue.enqueue("bob", "INSERT 0 b").await);
        assert!(queue.enqueue("alice", "DEL 0 1").await);

        let records = queue.drain().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].user, "alice");
        assert_eq!(records[0].line, "INSERT 0 a");
        assert_eq!(records[1].user, "bob");
        assert_eq!(records[2].line, "DEL 0 1");
        assert!(records[0].queued_at <= records[2].queued_at);
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let queue = CommandQueue::new(16);
        queue.enqueue("alice", "NEWLINE 0").await;
        assert_eq!(queue.len().await, 1);
        let _ = queue.drain().await;
        assert!(queue.is_empty().await);
        assert!(queue.drain().await.is_empty());
    }

    #[tokio::test]
    async fn full_queue_reports_back_pressure() {
        let queue = CommandQueue::new(2);
        assert!(queue.enqueue("a", "NEWLINE 0").await);
        assert!(queue.enqueue("a", "NEWLINE 1").await);
        assert!(!queue.enqueue("a", "NEWLINE 2").await);
        assert_eq!(queue.len().await, 2);

        // Draining frees the capacity again.
        let _ = queue.drain().await;
        assert!(queue.enqueue("a", "NEWLINE 3").await);
    }
}
