//! # logos-docs — Shared document collaboration engine
//!
//! Lets many agents edit line ranges of shared documents, comment on lines,
//! and see each other's cursors, concurrently and safely.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   JSON Request    ┌──────────────────┐
//! │ DocumentsAdapter │ ────────────────► │ DocumentEngine   │
//! │ (per agent)      │ ◄──────────────── │ (registry)       │
//! └──────────────────┘     Envelope      └────────┬─────────┘
//!                                                 │ per document
//!                          ┌──────────────────────┼───────────────────────┐
//!                          ▼                      ▼                       ▼
//!                  ┌───────────────┐     ┌─────────────────┐    ┌─────────────────┐
//!                  │ Document      │     │ AccessControl   │    │ PresenceTracker │
//!                  │ (tokio RwLock)│     │ (parking_lot)   │    │ (parking_lot)   │
//!                  │ lines + log + │     └─────────────────┘    └─────────────────┘
//!                  │ comments      │
//!                  └───────┬───────┘
//!                          │ stage → persist → commit
//!                          ▼
//!                  ┌───────────────┐
//!                  │ DocumentStore │
//!                  │ (RocksDB)     │
//!                  └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`lines`] — line content, ranges and splicing
//! - [`access`] — permission levels and per-document access maps
//! - [`history`] — operation log and replay
//! - [`comments`] — line-anchored comments and re-anchoring
//! - [`presence`] — ephemeral cursors with idle expiry
//! - [`document`] — one document's durable state, staged mutations
//! - [`engine`] — the public async operations
//! - [`storage`] — durability trait, frame codec, RocksDB store
//! - [`protocol`] / [`adapter`] — JSON requests and response envelopes

pub mod access;
pub mod adapter;
pub mod comments;
pub mod document;
pub mod engine;
pub mod error;
pub mod history;
pub mod ids;
pub mod lines;
pub mod presence;
pub mod protocol;
pub mod storage;

// Re-exports for convenience
pub use access::{AccessControl, Permission};
pub use adapter::DocumentsAdapter;
pub use comments::Comment;
pub use engine::{
    CreatedDocument, DocumentEngine, DocumentSnapshot, DocumentSummary, EditResult, EngineConfig,
};
pub use error::{DocError, ErrorKind, Result};
pub use history::{Operation, OperationKind, OperationPayload};
pub use ids::{AgentId, CommentId, DocumentId};
pub use presence::PresenceView;
pub use protocol::{Envelope, ErrorBody, ProtocolError, Request, Status};
pub use storage::{DocumentStorage, DocumentStore, StoreConfig, StoreError};
