//! Markdown edit commands over the segment store.
//!
//! Every command validates its version argument against the document's
//! current version, then its coordinates against the visible text, and
//! only then rewrites through [`Document::put_text`], [`Document::add_text`]
//! and [`Document::delete_range`]. Nothing here commits; the batch loop
//! owns the commit barrier.

use crate::document::{Document, EditError};

/// Inline range formatters wrap `[start, end)` with a marker pair.
const BOLD_MARKER: &str = "**";
const ITALIC_MARKER: &str = "*";
const CODE_MARKER: &str = "`";

impl Document {
    /// `INSERT <pos> <text>`: plain text insertion.
    pub fn insert(&mut self, version: u64, pos: usize, text: &str) -> Result<(), EditError> {
        self.check_version(version)?;
        self.put_text(pos, text.as_bytes())
    }

    /// `DEL <pos> <len>`: range deletion, truncated at the end.
    pub fn delete(&mut self, version: u64, pos: usize, len: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        self.delete_range(pos, len)
    }

    /// `NEWLINE <pos>`: insert a line break.
    pub fn newline(&mut self, version: u64, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        self.add_text(pos, b"\n")
    }

    /// `HEADING <level> <pos>` for levels 1 to 3.
    pub fn heading(&mut self, version: u64, level: u8, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        if !(1..=3).contains(&level) {
            return Err(EditError::InvalidPosition);
        }
        let mut marker = "#".repeat(level as usize);
        marker.push(' ');
        self.insert_block_element(pos, &marker)
    }

    /// `BOLD <start> <end>`.
    pub fn bold(&mut self, version: u64, start: usize, end: usize) -> Result<(), EditError> {
        self.check_range(version, start, end)?;
        self.apply_range_format(start, end, BOLD_MARKER)
    }

    /// `ITALIC <start> <end>`.
    pub fn italic(&mut self, version: u64, start: usize, end: usize) -> Result<(), EditError> {
        self.check_range(version, start, end)?;
        self.apply_range_format(start, end, ITALIC_MARKER)
    }

    /// `CODE <start> <end>`: inline code span.
    pub fn code(&mut self, version: u64, start: usize, end: usize) -> Result<(), EditError> {
        self.check_range(version, start, end)?;
        self.apply_range_format(start, end, CODE_MARKER)
    }

    /// `BLOCKQUOTE <pos>`.
    pub fn blockquote(&mut self, version: u64, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        self.insert_block_element(pos, "> ")
    }

    /// `UNORDERED_LIST <pos>`.
    pub fn unordered_list(&mut self, version: u64, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        self.insert_block_element(pos, "- ")
    }

    /// `HORIZONTAL_RULE <pos>`.
    pub fn horizontal_rule(&mut self, version: u64, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        self.insert_block_element(pos, "---\n")
    }

    /// `LINK <start> <end> <url>`: wraps the range as `[text](url)`.
    pub fn link(
        &mut self,
        version: u64,
        start: usize,
        end: usize,
        url: &str,
    ) -> Result<(), EditError> {
        self.check_range(version, start, end)?;
        let closing = format!("]({url})");
        self.add_text(end, closing.as_bytes())?;
        self.add_text(start, b"[")
    }

    /// `ORDERED_LIST <pos>`: insert the next list item and renumber the
    /// run of numbered lines that follows.
    pub fn ordered_list(&mut self, version: u64, pos: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        let flat = self.flatten();
        if pos > flat.len() {
            return Err(EditError::InvalidPosition);
        }
        let at_line_start = pos == 0 || flat[pos - 1] == b'\n';
        let prev = previous_list_number(&flat, pos);
        let marker = if at_line_start {
            format!("{}. ", prev + 1)
        } else {
            format!("\n{}. ", prev + 1)
        };
        self.add_text(pos, marker.as_bytes())?;
        self.renumber_following(&flat, pos, prev + 2)
    }

    /// Renumbers the contiguous run of numbered lines after an insertion
    /// at `pos`. The first candidate is the remainder of the line at
    /// `pos` itself: the inserted marker claimed its line start, so its
    /// replacement prefix carries a leading newline. Scanning stops at
    /// the first line that is not a numbered item.
    fn renumber_following(
        &mut self,
        flat: &[u8],
        pos: usize,
        mut next: u64,
    ) -> Result<(), EditError> {
        let mut at = pos;
        let mut first = true;
        loop {
            if first && (at >= flat.len() || flat[at] == b'\n') {
                // Empty remainder: the new item already ends its line.
            } else if let Some(prefix_len) = list_prefix_len(flat, at) {
                self.delete_range(at, prefix_len)?;
                let replacement = if first {
                    format!("\n{next}. ")
                } else {
                    format!("{next}. ")
                };
                self.add_text(at, replacement.as_bytes())?;
                next += 1;
            } else {
                break;
            }
            let eol = line_end(flat, at);
            if eol >= flat.len() {
                break;
            }
            at = eol + 1;
            first = false;
        }
        Ok(())
    }

    /// Block-level markers must start a line: the marker is inserted
    /// as-is at a line start, otherwise prefixed with a newline.
    fn insert_block_element(&mut self, pos: usize, marker: &str) -> Result<(), EditError> {
        let flat = self.flatten();
        if pos > flat.len() {
            return Err(EditError::InvalidPosition);
        }
        if pos == 0 || flat[pos - 1] == b'\n' {
            self.add_text(pos, marker.as_bytes())
        } else {
            let mut prefixed = Vec::with_capacity(marker.len() + 1);
            prefixed.push(b'\n');
            prefixed.extend_from_slice(marker.as_bytes());
            self.add_text(pos, &prefixed)
        }
    }

    /// Closing marker goes in first so both insertions address the same
    /// baseline coordinates.
    fn apply_range_format(
        &mut self,
        start: usize,
        end: usize,
        marker: &str,
    ) -> Result<(), EditError> {
        self.add_text(end, marker.as_bytes())?;
        self.add_text(start, marker.as_bytes())
    }

    fn check_version(&self, version: u64) -> Result<(), EditError> {
        if version != self.version() {
            return Err(EditError::OutdatedVersion);
        }
        Ok(())
    }

    fn check_range(&self, version: u64, start: usize, end: usize) -> Result<(), EditError> {
        self.check_version(version)?;
        if end <= start {
            return Err(EditError::InvalidPosition);
        }
        Ok(())
    }
}

/// Byte offset of the `\n` ending the line at `from`, or the text length.
fn line_end(flat: &[u8], from: usize) -> usize {
    flat[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(flat.len(), |off| from + off)
}

/// Length of a `digits ". "` list prefix at `at`, if one starts there.
fn list_prefix_len(flat: &[u8], at: usize) -> Option<usize> {
    let digits = flat[at..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &flat[at + digits..];
    if rest.starts_with(b". ") {
        Some(digits + 2)
    } else {
        None
    }
}

/// Number of the list item on the line preceding `pos`, or 0.
fn previous_list_number(flat: &[u8], pos: usize) -> u64 {
    if pos == 0 {
        return 0;
    }
    let mut i = pos as i64 - 2;
    while i >= 0 && flat[i as usize] != b'\n' {
        i -= 1;
    }
    let line_start = (i + 1) as usize;
    match list_prefix_len(flat, line_start) {
        Some(prefix_len) => std::str::from_utf8(&flat[line_start..line_start + prefix_len - 2])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0),
        None => 0,
    }
}
