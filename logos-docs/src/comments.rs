//! Line-anchored comment threads.
//!
//! Comments are never deleted by edits. When the anchored line is replaced
//! the comment is kept, flagged `orphaned`, and clamped onto a valid line.

use serde::{Deserialize, Serialize};

use crate::ids::{now_ms, AgentId, CommentId, DocumentId};
use crate::lines::LineRange;

/// A single comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub document_id: DocumentId,
    /// 1-based line the comment is attached to.
    pub anchor_line: usize,
    pub author: AgentId,
    pub text: String,
    pub created_at_ms: u64,
    pub resolved: bool,
    /// Set once the anchored line has been replaced or deleted.
    pub orphaned: bool,
}

impl Comment {
    pub fn new(document_id: DocumentId, anchor_line: usize, author: AgentId, text: String) -> Self {
        Self::with_id(CommentId::new(), document_id, anchor_line, author, text)
    }

    pub fn with_id(
        id: CommentId,
        document_id: DocumentId,
        anchor_line: usize,
        author: AgentId,
        text: String,
    ) -> Self {
        Self {
            id,
            document_id,
            anchor_line,
            author,
            text,
            created_at_ms: now_ms(),
            resolved: false,
            orphaned: false,
        }
    }
}

/// Shift or orphan comment anchors after `range` was replaced by
/// `range.removed() + delta` lines, leaving `new_len` lines in total.
///
/// Anchors above the range are untouched, anchors below it move by
/// `delta`, anchors inside it are clamped to `max(1, min(start, new_len))`
/// and marked orphaned.
pub fn reanchor(comments: &mut [Comment], range: LineRange, delta: i64, new_len: usize) {
    for comment in comments.iter_mut() {
        let anchor = comment.anchor_line;
        if anchor < range.start {
            continue;
        }
        if anchor > range.end {
            let shifted = (anchor as i64 + delta).max(1) as usize;
            // Only an anchor parked on an empty document can exceed the length
            comment.anchor_line = shifted.min(new_len.max(1));
        } else {
            comment.anchor_line = range.start.min(new_len).max(1);
            comment.orphaned = true;
        }
    }
}

/// All comments of one document, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentStore {
    comments: Vec<Comment>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_comments(comments: Vec<Comment>) -> Self {
        Self { comments }
    }

    pub fn all(&self) -> &[Comment] {
        &self.comments
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    pub fn add(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Mark a comment resolved. Returns `Some(true)` if it changed,
    /// `Some(false)` if it was already resolved, `None` if unknown.
    pub fn resolve(&mut self, id: CommentId) -> Option<bool> {
        let comment = self.comments.iter_mut().find(|c| c.id == id)?;
        if comment.resolved {
            return Some(false);
        }
        comment.resolved = true;
        Some(true)
    }

    /// Apply [`reanchor`] to every comment.
    pub fn reanchor(&mut self, range: LineRange, delta: i64, new_len: usize) {
        reanchor(&mut self.comments, range, delta, new_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_at(line: usize) -> Comment {
        Comment::new(DocumentId::new(), line, AgentId::new("reviewer"), format!("on {line}"))
    }

    #[test]
    fn test_comment_shifts_when_lines_inserted_above() {
        // replace(1, 1, ["A", "B"]) on a 5-line doc: delta +1
        let mut comments = vec![comment_at(3)];
        reanchor(&mut comments, LineRange::new(1, 1, 5).unwrap(), 1, 6);
        assert_eq!(comments[0].anchor_line, 4);
        assert!(!comments[0].orphaned);
    }

    #[test]
    fn test_comment_inside_replaced_range_is_orphaned() {
        // replace(4, 6, ["Z"]) on an 8-line doc: delta -2
        let mut comments = vec![comment_at(5)];
        reanchor(&mut comments, LineRange::new(4, 6, 8).unwrap(), -2, 6);
        assert!(comments[0].orphaned);
        assert_eq!(comments[0].anchor_line, 4);
    }

    #[test]
    fn test_comment_above_range_untouched() {
        let mut comments = vec![comment_at(2)];
        reanchor(&mut comments, LineRange::new(4, 6, 8).unwrap(), -2, 6);
        assert_eq!(comments[0].anchor_line, 2);
        assert!(!comments[0].orphaned);
    }

    #[test]
    fn test_comment_below_range_shifts_up_on_deletion() {
        let mut comments = vec![comment_at(8)];
        reanchor(&mut comments, LineRange::new(4, 6, 8).unwrap(), -3, 5);
        assert_eq!(comments[0].anchor_line, 5);
    }

    #[test]
    fn test_pure_insertion_shifts_anchor_at_start() {
        // Insert 2 lines before line 3: the comment on line 3 moves to 5.
        let mut comments = vec![comment_at(3), comment_at(2)];
        reanchor(&mut comments, LineRange::new(3, 2, 4).unwrap(), 2, 6);
        assert_eq!(comments[0].anchor_line, 5);
        assert!(!comments[0].orphaned);
        assert_eq!(comments[1].anchor_line, 2);
    }

    #[test]
    fn test_orphan_clamped_when_document_shrinks() {
        // Whole 4-line document replaced by nothing.
        let mut comments = vec![comment_at(3)];
        reanchor(&mut comments, LineRange::whole(4), -4, 0);
        assert!(comments[0].orphaned);
        assert_eq!(comments[0].anchor_line, 1);
    }

    #[test]
    fn test_orphaned_comment_keeps_shifting() {
        let mut comments = vec![comment_at(2)];
        reanchor(&mut comments, LineRange::new(2, 2, 3).unwrap(), 0, 3);
        assert!(comments[0].orphaned);
        reanchor(&mut comments, LineRange::new(1, 0, 3).unwrap(), 1, 4);
        assert_eq!(comments[0].anchor_line, 3);
        assert!(comments[0].orphaned);
    }

    #[test]
    fn test_anchor_on_empty_document_stays_in_bounds() {
        let mut comments = vec![comment_at(1)];
        reanchor(&mut comments, LineRange::whole(0), 3, 3);
        assert_eq!(comments[0].anchor_line, 3);
    }

    #[test]
    fn test_resolve_idempotent() {
        let mut store = CommentStore::new();
        let c = comment_at(1);
        let id = c.id;
        store.add(c);

        assert_eq!(store.resolve(id), Some(true));
        assert_eq!(store.resolve(id), Some(false));
        assert!(store.get(id).unwrap().resolved);
        assert_eq!(store.resolve(CommentId::new()), None);
    }
}
