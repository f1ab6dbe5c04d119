//! Line-oriented document content with a monotonic version counter.
//!
//! Lines are addressed 1-based and ranges are inclusive on both ends.
//! An insert-only range has `end == start - 1`.

use serde::{Deserialize, Serialize};

use crate::error::{DocError, Result};

/// Split raw text into lines. Handles `\n` and `\r\n`; a trailing newline
/// does not produce an empty last line, and empty text is zero lines.
pub fn split_content(content: &str) -> Vec<String> {
    content.lines().map(str::to_owned).collect()
}

/// Join lines back into text.
pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

/// A validated, 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Validate `start..=end` against a document of `len` lines.
    ///
    /// Requires `1 <= start <= end + 1 <= len + 1`.
    pub fn new(start: usize, end: usize, len: usize) -> Result<Self> {
        if start == 0 {
            return Err(DocError::invalid("start_line must be >= 1"));
        }
        if end < start - 1 {
            return Err(DocError::invalid(format!(
                "end_line {end} is before start_line {start} - 1"
            )));
        }
        if end > len {
            return Err(DocError::invalid(format!(
                "end_line {end} exceeds document length {len}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole document, used by full saves.
    pub fn whole(len: usize) -> Self {
        Self { start: 1, end: len }
    }

    /// Number of existing lines the range covers.
    pub fn removed(&self) -> usize {
        self.end + 1 - self.start
    }

    /// Net line-count change when `inserted` lines replace this range.
    pub fn delta(&self, inserted: usize) -> i64 {
        inserted as i64 - self.removed() as i64
    }
}

/// Ordered lines plus the version they correspond to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineStore {
    lines: Vec<String>,
    version: u64,
}

impl LineStore {
    /// The empty document at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: Vec<String>, version: u64) -> Self {
        Self { lines, version }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn content(&self) -> String {
        join_lines(&self.lines)
    }

    /// Validate a range against the current length.
    pub fn range(&self, start: usize, end: usize) -> Result<LineRange> {
        LineRange::new(start, end, self.lines.len())
    }

    /// Replace `range` with `replacement` and bump the version.
    ///
    /// Returns the net line-count delta. The range must have been
    /// validated against this store.
    pub fn splice(&mut self, range: LineRange, replacement: Vec<String>) -> i64 {
        let delta = range.delta(replacement.len());
        let from = range.start - 1;
        let to = from + range.removed();
        self.lines.splice(from..to, replacement);
        self.version += 1;
        delta
    }

    /// Bump the version without touching content (comment operations).
    pub fn bump(&mut self) {
        self.version += 1;
    }
}
