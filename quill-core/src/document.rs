//! Two-layer segment store with version gating.
//!
//! The committed layer is the canonical text of the current version. The
//! working layer is scratch for the in-flight version: clones of the
//! committed segments, new `PendingInsert` segments, and `PendingDelete`
//! markers covering committed ranges scheduled for removal.
//!
//! Position rule: only non-pending-insert segments contribute to logical
//! positions. Pending deletes still count until commit, so every command
//! in a batch addresses the same committed baseline coordinates.

use thiserror::Error;

use crate::segment::{Segment, SegmentState};

/// Why an edit was refused. The server turns these into the textual
/// `Reject …` results carried in each broadcast delta.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EditError {
    #[error("position out of range or malformed arguments")]
    InvalidPosition,
    #[error("position covered by a pending delete in this batch")]
    DeletedPosition,
    #[error("command targets a stale document version")]
    OutdatedVersion,
}

/// Tie-break for insertions landing at the same logical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertOrder {
    /// Ahead of any uncommitted text already inserted at this point.
    /// Explicit `INSERT` commands use this: repeating `INSERT 0 …` builds
    /// the document front-to-back within one batch.
    BeforePending,
    /// After any uncommitted text already inserted at this point.
    /// Formatter and block-marker insertions use this so a later marker
    /// never splits an earlier one.
    AfterPending,
}

/// The shared document: committed baseline, working scratch, version.
#[derive(Debug, Default)]
pub struct Document {
    committed: Vec<Segment>,
    working: Vec<Segment>,
    version: u64,
}

impl Document {
    /// An empty document at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document with committed content, for tests and recovery.
    pub fn from_committed(content: impl Into<Vec<u8>>, version: u64) -> Self {
        let content = content.into();
        let committed = if content.is_empty() {
            Vec::new()
        } else {
            vec![Segment::committed(content)]
        };
        Self {
            committed,
            working: Vec::new(),
            version,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether any uncommitted edits exist in the working layer.
    pub fn has_pending(&self) -> bool {
        !self.working.is_empty()
    }

    /// Concatenation of the committed segment contents.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.committed.iter().map(Segment::len).sum());
        for seg in &self.committed {
            out.extend_from_slice(seg.content());
        }
        out
    }

    /// Committed text as a `String`, for transport and snapshots.
    pub fn flatten_text(&self) -> String {
        String::from_utf8_lossy(&self.flatten()).into_owned()
    }

    /// Sum of lengths of non-pending-insert segments: the coordinate
    /// space commands address. Equals the committed length until commit.
    pub fn visible_len(&self) -> usize {
        let layer = if self.working.is_empty() {
            &self.committed
        } else {
            &self.working
        };
        layer
            .iter()
            .filter(|s| s.is_visible())
            .map(Segment::len)
            .sum()
    }

    /// Inserts `bytes` at `pos`, ahead of other uncommitted insertions at
    /// the same point. Used by explicit `INSERT` commands.
    pub fn put_text(&mut self, pos: usize, bytes: &[u8]) -> Result<(), EditError> {
        self.insert_at(pos, bytes, InsertOrder::BeforePending)
    }

    /// Inserts `bytes` at `pos`, after other uncommitted insertions at
    /// the same point. Used by formatters and block markers.
    pub fn add_text(&mut self, pos: usize, bytes: &[u8]) -> Result<(), EditError> {
        self.insert_at(pos, bytes, InsertOrder::AfterPending)
    }

    /// Marks `[pos, pos + len)` of the visible text for deletion. A
    /// window overrunning the end deletes to the end. Refused with
    /// `DeletedPosition` when it touches bytes already marked deleted in
    /// this batch.
    pub fn delete_range(&mut self, pos: usize, len: usize) -> Result<(), EditError> {
        if pos > self.visible_len() {
            return Err(EditError::InvalidPosition);
        }
        if len == 0 {
            return Ok(());
        }
        self.seed_working();

        let end = pos.saturating_add(len);
        let mut acc = 0usize; // visible bytes walked so far
        let mut idx = 0usize;
        while idx < self.working.len() {
            if !self.working[idx].is_visible() {
                idx += 1;
                continue;
            }
            let seg_len = self.working[idx].len();
            let seg_start = acc;
            let seg_end = acc + seg_len;
            if seg_end <= pos {
                acc = seg_end;
                idx += 1;
                continue;
            }
            if seg_start >= end {
                break;
            }
            if self.working[idx].state() == SegmentState::PendingDelete {
                return Err(EditError::DeletedPosition);
            }
            // Carve the intersection out of this segment. Prefix and
            // suffix keep their state; the middle becomes a delete marker.
            let cut_start = pos.max(seg_start) - seg_start;
            let cut_end = end.min(seg_end) - seg_start;
            if cut_end < seg_len {
                let suffix = self.working[idx].split_off(cut_end);
                self.working.insert(idx + 1, suffix);
            }
            if cut_start > 0 {
                let mid = self.working[idx].split_off(cut_start);
                self.working.insert(idx + 1, mid);
                idx += 1;
            }
            self.working[idx].set_state(SegmentState::PendingDelete);
            acc = seg_start + cut_end;
            idx += 1;
        }
        Ok(())
    }

    /// Promotes the working layer: delete markers are dropped, pending
    /// inserts become committed, survivors carry over. The version always
    /// advances, even for a batch whose every command was rejected.
    pub fn commit(&mut self) {
        if !self.working.is_empty() {
            let mut promoted = Vec::with_capacity(self.working.len());
            for mut seg in self.working.drain(..) {
                match seg.state() {
                    SegmentState::PendingDelete => {}
                    SegmentState::PendingInsert | SegmentState::Committed => {
                        seg.set_state(SegmentState::Committed);
                        promoted.push(seg);
                    }
                }
            }
            self.committed = promoted;
        }
        self.version += 1;
    }

    /// Clones the committed baseline into the working layer before the
    /// first mutation of a version.
    fn seed_working(&mut self) {
        if self.working.is_empty() {
            self.working = self.committed.clone();
        }
    }

    fn insert_at(&mut self, pos: usize, bytes: &[u8], order: InsertOrder) -> Result<(), EditError> {
        if pos > self.visible_len() {
            return Err(EditError::InvalidPosition);
        }
        self.seed_working();

        let mut acc = 0usize; // visible bytes walked so far
        let mut idx = 0usize;
        while idx < self.working.len() {
            let seg = &self.working[idx];
            if !seg.is_visible() {
                if acc == pos && order == InsertOrder::BeforePending {
                    break;
                }
                idx += 1;
                continue;
            }
            if acc == pos {
                break;
            }
            let seg_len = seg.len();
            if acc + seg_len > pos {
                // Strictly inside a visible segment: split it.
                if seg.state() == SegmentState::PendingDelete {
                    return Err(EditError::DeletedPosition);
                }
                let tail = self.working[idx].split_off(pos - acc);
                self.working.insert(idx + 1, tail);
                idx += 1;
                break;
            }
            acc += seg_len;
            idx += 1;
        }
        self.working.insert(idx, Segment::pending_insert(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(doc: &Document) -> String {
        String::from_utf8(doc.flatten()).unwrap()
    }

    #[test]
    fn starts_empty_at_version_zero() {
        let doc = Document::new();
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.visible_len(), 0);
        assert!(doc.flatten().is_empty());
    }

    #[test]
    fn insert_is_invisible_until_commit() {
        let mut doc = Document::new();
        doc.put_text(0, b"hello").unwrap();
        assert!(doc.flatten().is_empty());
        assert_eq!(doc.visible_len(), 0);
        doc.commit();
        assert_eq!(committed(&doc), "hello");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn put_text_places_newer_text_first_at_same_position() {
        let mut doc = Document::new();
        doc.put_text(0, b"World").unwrap();
        doc.put_text(0, b"Hello ").unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "Hello World");
    }

    #[test]
    fn add_text_places_newer_text_last_at_same_position() {
        let mut doc = Document::new();
        doc.add_text(0, b"one").unwrap();
        doc.add_text(0, b"two").unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "onetwo");
    }

    #[test]
    fn insert_inside_a_segment_splits_it() {
        let mut doc = Document::from_committed("helloworld", 1);
        doc.put_text(5, b", ").unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "hello, world");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn insert_past_visible_end_is_rejected() {
        let mut doc = Document::from_committed("abc", 1);
        assert_eq!(doc.put_text(4, b"x"), Err(EditError::InvalidPosition));
        // Pending inserts do not extend the addressable range.
        doc.put_text(3, b"defg").unwrap();
        assert_eq!(doc.put_text(4, b"x"), Err(EditError::InvalidPosition));
    }

    #[test]
    fn delete_middle_preserves_prefix_and_suffix() {
        let mut doc = Document::from_committed("Hello World", 1);
        doc.delete_range(5, 6).unwrap();
        // Deletes still count toward positions until commit.
        assert_eq!(doc.visible_len(), 11);
        doc.commit();
        assert_eq!(committed(&doc), "Hello");
    }

    #[test]
    fn delete_overrunning_end_deletes_to_end() {
        let mut doc = Document::from_committed("abcdef", 1);
        doc.delete_range(3, 1000).unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "abc");
    }

    #[test]
    fn delete_past_visible_end_is_rejected() {
        let mut doc = Document::from_committed("abc", 1);
        assert_eq!(doc.delete_range(4, 1), Err(EditError::InvalidPosition));
    }

    #[test]
    fn delete_of_zero_bytes_is_a_no_op() {
        let mut doc = Document::from_committed("abc", 1);
        doc.delete_range(1, 0).unwrap();
        assert!(!doc.has_pending());
        doc.commit();
        assert_eq!(committed(&doc), "abc");
    }

    #[test]
    fn delete_spanning_multiple_segments() {
        let mut doc = Document::from_committed("abcdef", 1);
        // Split the committed run into three segments first.
        doc.put_text(2, b"X").unwrap();
        doc.put_text(4, b"Y").unwrap();
        doc.delete_range(1, 4).unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "aXYf");
    }

    #[test]
    fn overlapping_deletes_in_one_batch_are_refused() {
        let mut doc = Document::from_committed("abcdef", 1);
        doc.delete_range(1, 3).unwrap();
        assert_eq!(doc.delete_range(2, 2), Err(EditError::DeletedPosition));
        // Disjoint windows are still fine.
        doc.delete_range(4, 1).unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "af");
    }

    #[test]
    fn insert_inside_pending_delete_is_refused() {
        let mut doc = Document::from_committed("abcdef", 1);
        doc.delete_range(1, 4).unwrap();
        assert_eq!(doc.put_text(3, b"x"), Err(EditError::DeletedPosition));
        // Boundaries of the deleted window remain addressable.
        doc.put_text(1, b"x").unwrap();
        doc.put_text(5, b"y").unwrap();
        doc.commit();
        assert_eq!(committed(&doc), "axyf");
    }

    #[test]
    fn commit_without_edits_still_advances_version() {
        let mut doc = Document::from_committed("abc", 3);
        doc.commit();
        assert_eq!(doc.version(), 4);
        assert_eq!(committed(&doc), "abc");
    }

    #[test]
    fn working_layer_mirrors_committed_text_before_commit() {
        let mut doc = Document::from_committed("abcdef", 1);
        doc.put_text(3, b"INSERTED").unwrap();
        doc.delete_range(1, 2).unwrap();
        // Visible bytes (committed + pending deletes) still spell the baseline.
        assert_eq!(doc.visible_len(), 6);
    }

    #[test]
    fn interleaved_inserts_and_deletes_compose_on_the_baseline() {
        let mut doc = Document::from_committed("Hello World", 1);
        doc.delete_range(5, 6).unwrap();
        doc.put_text(0, b">> ").unwrap();
        doc.commit();
        assert_eq!(committed(&doc), ">> Hello");
        assert_eq!(doc.version(), 2);
    }
}
