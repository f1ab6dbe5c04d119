//! Durable storage for documents, comments and operation logs.
//!
//! Architecture:
//! ```text
//! ┌────────────────┐  commit(record, comments, op)  ┌───────────────────┐
//! │ DocumentEngine │ ─────────────────────────────► │ DocumentStorage   │
//! │ (in-memory)    │                                │ (trait)           │
//! └───────┬────────┘                                └─────────┬─────────┘
//!         │ on open                                           │
//!         ▼                                                   ▼
//! ┌────────────────┐     ┌──────────────────────────────────────────────┐
//! │ load_documents │     │ DocumentStore (RocksDB)                      │
//! │ + replay       │     │   CF "documents"  — record + line snapshot   │
//! └────────────────┘     │   CF "operations" — log, keyed id:sequence   │
//!                        │   CF "comments"   — comment set per document │
//!                        └──────────────────────────────────────────────┘
//! ```
//!
//! Every value is a checksummed LZ4 frame (see [`codec`]). A commit writes
//! the record, the comment set and the new log entry in one atomic batch.
//! Presence is never stored.

pub mod codec;
pub mod rocks;

pub use rocks::{DocumentStore, StoreConfig};

use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::comments::Comment;
use crate::history::Operation;
use crate::ids::{AgentId, DocumentId};

/// Storage errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("document not found in storage: {0}")]
    NotFound(DocumentId),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("corrupted document {document_id}: {reason}")]
    Corrupted { document_id: DocumentId, reason: String },
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Persisted header and content snapshot of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub name: String,
    pub owner: AgentId,
    pub created_at_ms: u64,
    pub version: u64,
    pub access: AccessControl,
    pub lines: Vec<String>,
}

/// Everything needed to rebuild a document after a restart.
#[derive(Debug, Clone)]
pub struct PersistedDocument {
    pub record: DocumentRecord,
    pub comments: Vec<Comment>,
    pub operations: Vec<Operation>,
}

/// Durability contract the engine writes through.
///
/// `commit` must be atomic: either the record, the comment set and the
/// operation are all stored, or none of them is.
pub trait DocumentStorage: Send + Sync {
    /// Load every stored document with its comments and full log.
    fn load_documents(&self) -> Result<Vec<PersistedDocument>, StoreError>;

    /// Store the current record and comments, appending `operation` if given.
    fn commit(
        &self,
        record: &DocumentRecord,
        comments: &[Comment],
        operation: Option<&Operation>,
    ) -> Result<(), StoreError>;

    /// Remove a document and everything it owns.
    fn delete(&self, id: DocumentId) -> Result<(), StoreError>;
}
