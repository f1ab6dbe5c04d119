//! Typed failures surfaced by the engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::access::Permission;
use crate::ids::{AgentId, CommentId, DocumentId};
use crate::storage::StoreError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DocError>;

/// Every way an engine call can fail.
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("comment {comment_id} not found in document {document_id}")]
    CommentNotFound {
        document_id: DocumentId,
        comment_id: CommentId,
    },

    #[error("agent {agent} needs {required} access to document {document_id}")]
    PermissionDenied {
        agent: AgentId,
        document_id: DocumentId,
        required: Permission,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("version conflict: expected {expected}, document is at {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("timed out after {waited:?} waiting for document {document_id}")]
    Timeout {
        document_id: DocumentId,
        waited: Duration,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Coarse error category, as reported in the wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidArgument,
    VersionConflict,
    OutOfRange,
    Timeout,
    Storage,
}

impl DocError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocError::DocumentNotFound(_) | DocError::CommentNotFound { .. } => ErrorKind::NotFound,
            DocError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            DocError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DocError::VersionConflict { .. } => ErrorKind::VersionConflict,
            DocError::OutOfRange(_) => ErrorKind::OutOfRange,
            DocError::Timeout { .. } => ErrorKind::Timeout,
            DocError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DocError::InvalidArgument(msg.into())
    }

    pub(crate) fn out_of_range(msg: impl Into<String>) -> Self {
        DocError::OutOfRange(msg.into())
    }
}
