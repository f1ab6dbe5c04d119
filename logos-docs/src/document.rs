//! Durable state of a single document.
//!
//! Mutations are split in two steps. A `stage_*` method validates the
//! request against the current state and computes the complete next state
//! (content, comments, log entry) without touching `self`. The caller
//! persists the [`Staged`] result and only then calls [`Document::commit`].
//! A failed write therefore never leaves a half-applied document behind.

use crate::access::AccessControl;
use crate::comments::{Comment, CommentStore};
use crate::error::{DocError, Result};
use crate::history::{replay, Operation, OperationLog, OperationPayload};
use crate::ids::{AgentId, CommentId, DocumentId};
use crate::lines::{LineRange, LineStore};
use crate::storage::{DocumentRecord, PersistedDocument, StoreError};

/// A fully computed, not yet applied mutation.
#[derive(Debug, Clone)]
pub struct Staged {
    operation: Operation,
    lines: LineStore,
    comments: CommentStore,
    delta: i64,
}

impl Staged {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn version(&self) -> u64 {
        self.lines.version()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Net line-count change (0 for comment operations).
    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn comments(&self) -> &[Comment] {
        self.comments.all()
    }
}

/// Lines, log and comments of one document.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    name: String,
    owner: AgentId,
    created_at_ms: u64,
    lines: LineStore,
    history: OperationLog,
    comments: CommentStore,
}

impl Document {
    /// Build a new document at version 1 from its CREATE entry.
    pub fn create(
        id: DocumentId,
        name: String,
        owner: AgentId,
        lines: Vec<String>,
        access: &AccessControl,
    ) -> Result<Self> {
        let operation = Operation::new(
            0,
            owner.clone(),
            OperationPayload::Create {
                name: name.clone(),
                lines,
                access: access.entries(),
            },
        );
        let mut store = LineStore::new();
        operation.apply(&mut store)?;
        let created_at_ms = operation.timestamp_ms;

        let mut history = OperationLog::new();
        history.append(operation)?;

        Ok(Self {
            id,
            name,
            owner,
            created_at_ms,
            lines: store,
            history,
            comments: CommentStore::new(),
        })
    }

    /// Rebuild from storage. The log is authoritative: the content is
    /// replayed from it and compared against the stored snapshot.
    pub fn restore(persisted: PersistedDocument) -> std::result::Result<(Self, AccessControl), StoreError> {
        let PersistedDocument { record, comments, operations } = persisted;
        let id = record.id;
        let corrupted = |reason: String| StoreError::Corrupted { document_id: id, reason };

        if operations.is_empty() {
            return Err(corrupted("operation log is empty".into()));
        }
        let history = OperationLog::from_entries(operations).map_err(|e| corrupted(e.to_string()))?;
        let lines = replay(history.entries()).map_err(|e| corrupted(e.to_string()))?;

        if lines.version() != record.version || lines.lines() != record.lines.as_slice() {
            log::warn!(
                "Document {id}: stored snapshot (v{}, {} lines) differs from log replay (v{}, {} lines), using replay",
                record.version,
                record.lines.len(),
                lines.version(),
                lines.len()
            );
        }
        if let Some(stray) = comments.iter().find(|c| c.document_id != id) {
            return Err(corrupted(format!("comment {} belongs to {}", stray.id, stray.document_id)));
        }

        let document = Self {
            id,
            name: record.name,
            owner: record.owner,
            created_at_ms: record.created_at_ms,
            lines,
            history,
            comments: CommentStore::from_comments(comments),
        };
        Ok((document, record.access))
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn version(&self) -> u64 {
        self.lines.version()
    }

    pub fn lines(&self) -> &[String] {
        self.lines.lines()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn content(&self) -> String {
        self.lines.content()
    }

    pub fn comments(&self) -> &[Comment] {
        self.comments.all()
    }

    pub fn history(&self) -> &OperationLog {
        &self.history
    }

    /// Content as it was right after `version` was produced.
    pub fn lines_at(&self, version: u64) -> Result<Vec<String>> {
        Ok(self.history.replay_to(version)?.lines().to_vec())
    }

    /// Snapshot for storage, reflecting the current state.
    pub fn record(&self, access: &AccessControl) -> DocumentRecord {
        self.build_record(&self.lines, access)
    }

    /// Snapshot for storage, reflecting `staged` as if it were committed.
    pub fn staged_record(&self, staged: &Staged, access: &AccessControl) -> DocumentRecord {
        self.build_record(&staged.lines, access)
    }

    fn build_record(&self, lines: &LineStore, access: &AccessControl) -> DocumentRecord {
        DocumentRecord {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            created_at_ms: self.created_at_ms,
            version: lines.version(),
            access: access.clone(),
            lines: lines.lines().to_vec(),
        }
    }

    // ─── Staging ──────────────────────────────────────────────────────

    /// Replace `start..=end` with `replacement`.
    pub fn stage_replace(
        &self,
        agent: &AgentId,
        start: usize,
        end: usize,
        replacement: Vec<String>,
        expected_version: Option<u64>,
    ) -> Result<Staged> {
        if let Some(expected) = expected_version {
            if expected != self.version() {
                return Err(DocError::VersionConflict { expected, actual: self.version() });
            }
        }
        let range = self.lines.range(start, end)?;
        let delta = range.delta(replacement.len());
        let payload = OperationPayload::ReplaceLines {
            start_line: start,
            end_line: end,
            lines: replacement,
            delta,
        };
        self.stage_splice(agent, range, delta, payload)
    }

    /// Replace the whole content, unconditionally.
    pub fn stage_save(&self, agent: &AgentId, new_lines: Vec<String>) -> Result<Staged> {
        let range = LineRange::whole(self.lines.len());
        let delta = range.delta(new_lines.len());
        let payload = OperationPayload::SaveFull {
            lines: new_lines,
            previous_line_count: self.lines.len(),
        };
        self.stage_splice(agent, range, delta, payload)
    }

    fn stage_splice(
        &self,
        agent: &AgentId,
        range: LineRange,
        delta: i64,
        payload: OperationPayload,
    ) -> Result<Staged> {
        let operation = Operation::new(self.version(), agent.clone(), payload);
        let mut lines = self.lines.clone();
        operation.apply(&mut lines)?;

        let mut comments = self.comments.clone();
        comments.reanchor(range, delta, lines.len());

        Ok(Staged { operation, lines, comments, delta })
    }

    /// Attach a new comment to `line_number`.
    pub fn stage_add_comment(
        &self,
        agent: &AgentId,
        line_number: usize,
        text: String,
    ) -> Result<(Staged, Comment)> {
        if text.trim().is_empty() {
            return Err(DocError::invalid("comment text must not be empty"));
        }
        if line_number == 0 {
            return Err(DocError::invalid("line_number must be >= 1"));
        }
        if line_number > self.lines.len() {
            return Err(DocError::out_of_range(format!(
                "line {line_number} is beyond the last line ({})",
                self.lines.len()
            )));
        }

        let comment = Comment::new(self.id, line_number, agent.clone(), text);
        let operation = Operation::new(
            self.version(),
            agent.clone(),
            OperationPayload::AddComment {
                comment_id: comment.id,
                line_number,
                text: comment.text.clone(),
            },
        );
        let mut lines = self.lines.clone();
        operation.apply(&mut lines)?;
        let mut comments = self.comments.clone();
        comments.add(comment.clone());

        Ok((Staged { operation, lines, comments, delta: 0 }, comment))
    }

    /// Resolve a comment. `Ok(None)` when it is already resolved.
    pub fn stage_resolve(&self, agent: &AgentId, comment_id: CommentId) -> Result<Option<Staged>> {
        let mut comments = self.comments.clone();
        match comments.resolve(comment_id) {
            None => Err(DocError::CommentNotFound { document_id: self.id, comment_id }),
            Some(false) => Ok(None),
            Some(true) => {
                let operation = Operation::new(
                    self.version(),
                    agent.clone(),
                    OperationPayload::ResolveComment { comment_id },
                );
                let mut lines = self.lines.clone();
                operation.apply(&mut lines)?;
                Ok(Some(Staged { operation, lines, comments, delta: 0 }))
            }
        }
    }

    /// Apply a staged mutation. It must have been staged against the
    /// current version.
    pub fn commit(&mut self, staged: Staged) -> Result<()> {
        let Staged { operation, lines, comments, .. } = staged;
        self.history.append(operation)?;
        self.lines = lines;
        self.comments = comments;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::split_content;

    fn editor() -> AgentId {
        AgentId::new("editor")
    }

    fn doc(content: &str) -> Document {
        let access = AccessControl::new(editor());
        Document::create(DocumentId::new(), "Doc".into(), editor(), split_content(content), &access).unwrap()
    }

    fn strings(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_is_version_one() {
        let d = doc("l1\nl2");
        assert_eq!(d.version(), 1);
        assert_eq!(d.lines(), &["l1", "l2"]);
        assert_eq!(d.history().len(), 1);
    }

    #[test]
    fn test_staging_does_not_mutate() {
        let d = doc("a\nb\nc");
        let staged = d.stage_replace(&editor(), 2, 2, strings(&["X", "Y"]), None).unwrap();
        assert_eq!(staged.version(), 2);
        assert_eq!(staged.line_count(), 4);
        assert_eq!(staged.delta(), 1);
        assert_eq!(d.version(), 1);
        assert_eq!(d.lines(), &["a", "b", "c"]);
    }

    #[test]
    fn test_commit_applies_staged() {
        let mut d = doc("a\nb\nc");
        let staged = d.stage_replace(&editor(), 2, 2, strings(&["X", "Y"]), Some(1)).unwrap();
        d.commit(staged).unwrap();
        assert_eq!(d.lines(), &["a", "X", "Y", "c"]);
        assert_eq!(d.version(), 2);
        assert_eq!(d.history().last_sequence(), 2);
    }

    #[test]
    fn test_stale_expected_version_conflicts() {
        let d = doc("a");
        let err = d.stage_replace(&editor(), 1, 1, strings(&["b"]), Some(0)).unwrap_err();
        assert!(matches!(err, DocError::VersionConflict { expected: 0, actual: 1 }));
    }

    #[test]
    fn test_comment_reanchored_by_replace() {
        let mut d = doc("1\n2\n3\n4\n5");
        let (staged, comment) = d.stage_add_comment(&editor(), 3, "check".into()).unwrap();
        d.commit(staged).unwrap();
        assert_eq!(d.version(), 2);

        let staged = d.stage_replace(&editor(), 1, 1, strings(&["A", "B"]), None).unwrap();
        d.commit(staged).unwrap();
        let c = d.comments().iter().find(|c| c.id == comment.id).unwrap();
        assert_eq!(c.anchor_line, 4);
        assert!(!c.orphaned);
    }

    #[test]
    fn test_add_comment_validation() {
        let d = doc("a\nb");
        assert!(matches!(
            d.stage_add_comment(&editor(), 3, "x".into()),
            Err(DocError::OutOfRange(_))
        ));
        assert!(matches!(
            d.stage_add_comment(&editor(), 0, "x".into()),
            Err(DocError::InvalidArgument(_))
        ));
        assert!(matches!(
            d.stage_add_comment(&editor(), 1, "  ".into()),
            Err(DocError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_twice_is_noop() {
        let mut d = doc("a");
        let (staged, comment) = d.stage_add_comment(&editor(), 1, "fix".into()).unwrap();
        d.commit(staged).unwrap();

        let staged = d.stage_resolve(&editor(), comment.id).unwrap().unwrap();
        d.commit(staged).unwrap();
        assert_eq!(d.version(), 3);
        assert!(d.stage_resolve(&editor(), comment.id).unwrap().is_none());
        assert!(matches!(
            d.stage_resolve(&editor(), CommentId::new()),
            Err(DocError::CommentNotFound { .. })
        ));
    }

    #[test]
    fn test_save_orphans_all_comments() {
        let mut d = doc("a\nb\nc");
        let (staged, _) = d.stage_add_comment(&editor(), 3, "note".into()).unwrap();
        d.commit(staged).unwrap();

        let staged = d.stage_save(&editor(), split_content("fresh\ncontent")).unwrap();
        assert_eq!(staged.delta(), -1);
        d.commit(staged).unwrap();
        assert_eq!(d.content(), "fresh\ncontent");
        assert!(d.comments()[0].orphaned);
        assert_eq!(d.comments()[0].anchor_line, 1);
    }

    #[test]
    fn test_lines_at_past_versions() {
        let mut d = doc("a\nb");
        let staged = d.stage_replace(&editor(), 3, 2, strings(&["c"]), None).unwrap();
        d.commit(staged).unwrap();

        assert!(d.lines_at(0).unwrap().is_empty());
        assert_eq!(d.lines_at(1).unwrap(), strings(&["a", "b"]));
        assert_eq!(d.lines_at(2).unwrap(), strings(&["a", "b", "c"]));
        assert!(d.lines_at(3).is_err());
    }

    #[test]
    fn test_restore_replays_log() {
        let mut d = doc("a\nb");
        let access = AccessControl::new(editor());
        let staged = d.stage_replace(&editor(), 1, 1, strings(&["z"]), None).unwrap();
        d.commit(staged).unwrap();

        let persisted = PersistedDocument {
            record: d.record(&access),
            comments: d.comments().to_vec(),
            operations: d.history().entries().to_vec(),
        };
        let (restored, restored_access) = Document::restore(persisted).unwrap();
        assert_eq!(restored.lines(), d.lines());
        assert_eq!(restored.version(), 2);
        assert_eq!(restored.created_at_ms(), d.created_at_ms());
        assert_eq!(restored_access, access);
    }

    #[test]
    fn test_restore_prefers_log_over_stale_snapshot() {
        let d = doc("from log");
        let access = AccessControl::new(editor());
        let mut record = d.record(&access);
        record.lines = strings(&["stale"]);

        let persisted = PersistedDocument {
            record,
            comments: Vec::new(),
            operations: d.history().entries().to_vec(),
        };
        let (restored, _) = Document::restore(persisted).unwrap();
        assert_eq!(restored.lines(), &["from log"]);
    }

    #[test]
    fn test_restore_rejects_empty_log() {
        let d = doc("x");
        let persisted = PersistedDocument {
            record: d.record(&AccessControl::new(editor())),
            comments: Vec::new(),
            operations: Vec::new(),
        };
        assert!(matches!(Document::restore(persisted), Err(StoreError::Corrupted { .. })));
    }
}
