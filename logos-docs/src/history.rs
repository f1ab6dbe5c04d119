//! Append-only operation log and deterministic replay.
//!
//! Every successfully applied mutation appends exactly one entry. Entry
//! `N` takes the document from version `N - 1` to version `N`, so folding
//! entries `1..=N` over the empty document reproduces version `N` exactly.

use serde::{Deserialize, Serialize};

use crate::access::Permission;
use crate::error::{DocError, Result};
use crate::ids::{now_ms, AgentId, CommentId};
use crate::lines::{LineRange, LineStore};

/// Kind tag of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Create,
    ReplaceLines,
    SaveFull,
    AddComment,
    ResolveComment,
}

/// Kind-specific data of a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPayload {
    Create {
        name: String,
        lines: Vec<String>,
        access: Vec<(AgentId, Permission)>,
    },
    ReplaceLines {
        start_line: usize,
        end_line: usize,
        lines: Vec<String>,
        /// Net line-count change, used to re-anchor comments on replay.
        delta: i64,
    },
    SaveFull {
        lines: Vec<String>,
        previous_line_count: usize,
    },
    AddComment {
        comment_id: CommentId,
        line_number: usize,
        text: String,
    },
    ResolveComment {
        comment_id: CommentId,
    },
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Create { .. } => OperationKind::Create,
            OperationPayload::ReplaceLines { .. } => OperationKind::ReplaceLines,
            OperationPayload::SaveFull { .. } => OperationKind::SaveFull,
            OperationPayload::AddComment { .. } => OperationKind::AddComment,
            OperationPayload::ResolveComment { .. } => OperationKind::ResolveComment,
        }
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Document-scoped, 1-based, gapless.
    pub sequence: u64,
    pub kind: OperationKind,
    pub agent: AgentId,
    pub timestamp_ms: u64,
    pub version_before: u64,
    pub version_after: u64,
    pub payload: OperationPayload,
}

impl Operation {
    /// Build the entry that takes a document from `version_before` to the next version.
    pub fn new(version_before: u64, agent: AgentId, payload: OperationPayload) -> Self {
        Self {
            sequence: version_before + 1,
            kind: payload.kind(),
            agent,
            timestamp_ms: now_ms(),
            version_before,
            version_after: version_before + 1,
            payload,
        }
    }

    /// Apply this entry to `store`. Comment entries only advance the version.
    pub fn apply(&self, store: &mut LineStore) -> Result<()> {
        if store.version() != self.version_before {
            return Err(DocError::invalid(format!(
                "operation {} expects version {}, found {}",
                self.sequence,
                self.version_before,
                store.version()
            )));
        }
        match &self.payload {
            OperationPayload::Create { lines, .. } => {
                let range = store.range(1, store.len())?;
                store.splice(range, lines.clone());
            }
            OperationPayload::ReplaceLines { start_line, end_line, lines, .. } => {
                let range = store.range(*start_line, *end_line)?;
                store.splice(range, lines.clone());
            }
            OperationPayload::SaveFull { lines, .. } => {
                store.splice(LineRange::whole(store.len()), lines.clone());
            }
            OperationPayload::AddComment { .. } | OperationPayload::ResolveComment { .. } => {
                store.bump();
            }
        }
        Ok(())
    }
}

/// Fold `ops` over the empty document.
pub fn replay(ops: &[Operation]) -> Result<LineStore> {
    let mut store = LineStore::new();
    for op in ops {
        op.apply(&mut store)?;
    }
    Ok(store)
}

/// Per-document, totally ordered history.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<Operation>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, rejecting gaps.
    pub fn from_entries(entries: Vec<Operation>) -> Result<Self> {
        let mut log = Self::new();
        for op in entries {
            log.append(op)?;
        }
        Ok(log)
    }

    /// Append an entry. Its sequence must directly follow the last one.
    pub fn append(&mut self, op: Operation) -> Result<()> {
        let expected = self.last_sequence() + 1;
        if op.sequence != expected || op.version_after != op.sequence {
            return Err(DocError::invalid(format!(
                "operation sequence {} does not follow {}",
                op.sequence,
                expected - 1
            )));
        }
        self.entries.push(op);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_sequence(&self) -> u64 {
        self.entries.last().map_or(0, |op| op.sequence)
    }

    pub fn entries(&self) -> &[Operation] {
        &self.entries
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Operation> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Reconstruct the content at `version` (0 is the empty document).
    pub fn replay_to(&self, version: u64) -> Result<LineStore> {
        if version > self.last_sequence() {
            return Err(DocError::out_of_range(format!(
                "version {version} is beyond the latest version {}",
                self.last_sequence()
            )));
        }
        replay(&self.entries[..version as usize])
    }
}
