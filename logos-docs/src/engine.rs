//! Document collaboration engine.
//!
//! The engine owns a registry of document handles. Each handle carries:
//! - the durable [`Document`] state behind a `tokio::sync::RwLock`, so
//!   mutations are serialized per document while reads share the lock;
//! - the access map and presence tracker behind their own `parking_lot`
//!   locks, which are never held across an `.await`.
//!
//! Every content-lock acquisition is bounded by [`EngineConfig::lock_timeout`]
//! and fails with [`DocError::Timeout`] instead of waiting forever. Lock
//! order is content → access; the registry lock is only held to clone a
//! handle and never while waiting on a document.
//!
//! Mutations follow stage → persist → commit: nothing in memory changes
//! until the storage batch has been written.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;

use crate::access::{AccessControl, Permission};
use crate::comments::Comment;
use crate::document::{Document, Staged};
use crate::error::{DocError, Result};
use crate::history::Operation;
use crate::ids::{AgentId, CommentId, DocumentId};
use crate::lines::split_content;
use crate::presence::{PresenceTracker, PresenceView, DEFAULT_IDLE_TIMEOUT};
use crate::storage::{DocumentRecord, DocumentStorage, DocumentStore, StoreConfig};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on waiting for a document lock (default: 5s)
    pub lock_timeout: Duration,
    /// Cursors older than this are not reported (default: 60s)
    pub presence_idle_timeout: Duration,
    /// Period of the optional presence sweeper (default: 30s)
    pub presence_sweep_interval: Duration,
    /// History page size when the caller gives none (default: 50)
    pub default_history_limit: usize,
    /// Persistent storage; `None` keeps everything in memory
    pub storage: Option<StoreConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            presence_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            presence_sweep_interval: Duration::from_secs(30),
            default_history_limit: 50,
            storage: None,
        }
    }
}

impl EngineConfig {
    /// In-memory config with a short lock timeout.
    pub fn for_testing() -> Self {
        Self {
            lock_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    pub fn with_storage(mut self, storage: StoreConfig) -> Self {
        self.storage = Some(storage);
        self
    }
}

/// Result of `create_document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDocument {
    pub document_id: DocumentId,
    pub version: u64,
}

/// Consistent read of a document at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub document_id: DocumentId,
    pub name: String,
    pub owner: AgentId,
    pub content: String,
    pub lines: Vec<String>,
    pub version: u64,
    pub comments: Vec<Comment>,
    pub presence: Vec<PresenceView>,
}

/// Result of a content mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResult {
    pub document_id: DocumentId,
    pub version: u64,
    pub line_count: usize,
    /// Net line-count change
    pub delta: i64,
}

/// Entry of `list_documents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    pub name: String,
    pub owner: AgentId,
    pub version: u64,
    pub line_count: usize,
    pub permission: Permission,
    pub created_at_ms: u64,
}

/// What a call needs from the caller.
#[derive(Debug, Clone, Copy)]
enum Need {
    Level(Permission),
    Owner,
}

/// Registry entry for one document.
struct DocumentHandle {
    id: DocumentId,
    name: String,
    owner: AgentId,
    created_at_ms: u64,
    state: RwLock<Document>,
    access: parking_lot::RwLock<AccessControl>,
    presence: PresenceTracker,
    // Mirrors of the content state, readable without the content lock
    version: AtomicU64,
    line_count: AtomicUsize,
    deleted: AtomicBool,
}

impl DocumentHandle {
    fn new(document: Document, access: AccessControl, idle_timeout: Duration) -> Self {
        Self {
            id: document.id(),
            name: document.name().to_string(),
            owner: document.owner().clone(),
            created_at_ms: document.created_at_ms(),
            version: AtomicU64::new(document.version()),
            line_count: AtomicUsize::new(document.line_count()),
            state: RwLock::new(document),
            access: parking_lot::RwLock::new(access),
            presence: PresenceTracker::new(idle_timeout),
            deleted: AtomicBool::new(false),
        }
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn authorize(&self, agent: &AgentId, need: Need) -> Result<()> {
        if self.is_deleted() {
            return Err(DocError::DocumentNotFound(self.id));
        }
        let access = self.access.read();
        match need {
            Need::Level(required) => access.check(self.id, agent, required),
            Need::Owner => access.check_owner(self.id, agent),
        }
    }

    fn publish(&self, document: &Document) {
        self.version.store(document.version(), Ordering::Release);
        self.line_count.store(document.line_count(), Ordering::Release);
    }
}

/// The collaboration engine.
pub struct DocumentEngine {
    config: EngineConfig,
    documents: RwLock<HashMap<DocumentId, Arc<DocumentHandle>>>,
    storage: Option<Arc<dyn DocumentStorage>>,
}

impl DocumentEngine {
    /// In-memory engine. `config.storage` is ignored; use [`open`](Self::open) for that.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            documents: RwLock::new(HashMap::new()),
            storage: None,
        }
    }

    /// Open the configured store (if any) and recover every document from it.
    pub fn open(config: EngineConfig) -> Result<Self> {
        match config.storage.clone() {
            Some(store_config) => {
                let store = DocumentStore::open(store_config)?;
                Self::with_storage(config, Arc::new(store))
            }
            None => Ok(Self::new(config)),
        }
    }

    /// Engine writing through `storage`, recovering what it already holds.
    pub fn with_storage(config: EngineConfig, storage: Arc<dyn DocumentStorage>) -> Result<Self> {
        let persisted = storage.load_documents()?;
        let total = persisted.len();

        let mut documents = HashMap::with_capacity(total);
        for entry in persisted {
            let (document, access) = Document::restore(entry)?;
            log::debug!(
                "Recovered document {} '{}' at v{}",
                document.id(),
                document.name(),
                document.version()
            );
            let handle = DocumentHandle::new(document, access, config.presence_idle_timeout);
            documents.insert(handle.id, Arc::new(handle));
        }
        log::info!("Recovery complete: {total} documents restored");

        Ok(Self {
            config,
            documents: RwLock::new(documents),
            storage: Some(storage),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    // ─── Documents ────────────────────────────────────────────────────

    /// Create a document owned by `agent`, at version 1.
    pub async fn create_document(
        &self,
        agent: &AgentId,
        name: &str,
        initial_content: &str,
        access_permissions: HashMap<AgentId, Permission>,
    ) -> Result<CreatedDocument> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DocError::invalid("document name must not be empty"));
        }

        let id = DocumentId::new();
        let access = AccessControl::with_grants(agent.clone(), access_permissions);
        let document = Document::create(
            id,
            name.to_string(),
            agent.clone(),
            split_content(initial_content),
            &access,
        )?;
        self.persist(&document.record(&access), &[], document.history().entries().last())?;

        let version = document.version();
        let lines = document.line_count();
        let handle = DocumentHandle::new(document, access, self.config.presence_idle_timeout);
        self.documents.write().await.insert(id, Arc::new(handle));

        log::info!("Created document {id} '{name}' ({lines} lines) for {agent}");
        Ok(CreatedDocument { document_id: id, version })
    }

    /// Current content, comments and live presence. Requires `Read`.
    pub async fn get_document(&self, agent: &AgentId, id: DocumentId) -> Result<DocumentSnapshot> {
        let handle = self.handle(id).await?;
        let doc = self.read_locked(&handle, agent, Need::Level(Permission::Read)).await?;
        Ok(Self::snapshot(&handle, &doc))
    }

    /// Like [`get_document`](Self::get_document), and places the caller's
    /// cursor at 1:1 if it has no live one.
    pub async fn open_document(&self, agent: &AgentId, id: DocumentId) -> Result<DocumentSnapshot> {
        let handle = self.handle(id).await?;
        let doc = self.read_locked(&handle, agent, Need::Level(Permission::Read)).await?;
        if handle.presence.join(agent) {
            log::trace!("{agent} opened {id}");
        }
        Ok(Self::snapshot(&handle, &doc))
    }

    fn snapshot(handle: &DocumentHandle, doc: &Document) -> DocumentSnapshot {
        DocumentSnapshot {
            document_id: handle.id,
            name: doc.name().to_string(),
            owner: doc.owner().clone(),
            content: doc.content(),
            lines: doc.lines().to_vec(),
            version: doc.version(),
            comments: doc.comments().to_vec(),
            presence: handle.presence.active(),
        }
    }

    /// Replace the whole content. Last writer wins. Requires `ReadWrite`.
    pub async fn save_document(
        &self,
        agent: &AgentId,
        id: DocumentId,
        new_content: &str,
    ) -> Result<EditResult> {
        let handle = self.handle(id).await?;
        let mut doc = self
            .write_locked(&handle, agent, Need::Level(Permission::ReadWrite))
            .await?;

        let staged = doc.stage_save(agent, split_content(new_content))?;
        let result = self.apply(&handle, &mut doc, staged)?;
        log::debug!(
            "{agent} saved document {id}: v{}, {} lines",
            result.version,
            result.line_count
        );
        Ok(result)
    }

    /// Replace lines `start..=end` (1-based, inclusive). Requires `ReadWrite`.
    ///
    /// `end == start - 1` inserts without deleting. With `expected_version`
    /// set, the edit only applies if the document is still at that version.
    pub async fn replace_lines(
        &self,
        agent: &AgentId,
        id: DocumentId,
        start_line: usize,
        end_line: usize,
        lines: Vec<String>,
        expected_version: Option<u64>,
    ) -> Result<EditResult> {
        let handle = self.handle(id).await?;
        let mut doc = self
            .write_locked(&handle, agent, Need::Level(Permission::ReadWrite))
            .await?;

        let staged = match doc.stage_replace(agent, start_line, end_line, lines, expected_version) {
            Ok(staged) => staged,
            Err(e @ DocError::VersionConflict { .. }) => {
                log::warn!("{agent} lost an edit race on document {id}: {e}");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let result = self.apply(&handle, &mut doc, staged)?;
        log::debug!(
            "{agent} replaced lines {start_line}..={end_line} of {id}: v{}, delta {}",
            result.version,
            result.delta
        );
        Ok(result)
    }

    // ─── Comments ─────────────────────────────────────────────────────

    /// Comment on an existing line. Requires `Read`; bumps the version.
    pub async fn add_comment(
        &self,
        agent: &AgentId,
        id: DocumentId,
        line_number: usize,
        text: &str,
    ) -> Result<Comment> {
        let handle = self.handle(id).await?;
        let mut doc = self
            .write_locked(&handle, agent, Need::Level(Permission::Read))
            .await?;

        let (staged, comment) = doc.stage_add_comment(agent, line_number, text.to_string())?;
        let result = self.apply(&handle, &mut doc, staged)?;
        log::debug!(
            "{agent} commented on line {line_number} of {id}: comment {}, v{}",
            comment.id,
            result.version
        );
        Ok(comment)
    }

    /// Mark a comment resolved. Requires `ReadWrite`.
    /// Returns `false` if it already was (no-op).
    pub async fn resolve_comment(
        &self,
        agent: &AgentId,
        id: DocumentId,
        comment_id: CommentId,
    ) -> Result<bool> {
        let handle = self.handle(id).await?;
        let mut doc = self
            .write_locked(&handle, agent, Need::Level(Permission::ReadWrite))
            .await?;

        match doc.stage_resolve(agent, comment_id)? {
            Some(staged) => {
                let result = self.apply(&handle, &mut doc, staged)?;
                log::debug!("{agent} resolved comment {comment_id} on {id}: v{}", result.version);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ─── Presence ─────────────────────────────────────────────────────

    /// Upsert the caller's cursor. Requires `Read`; never takes the content lock.
    pub async fn update_cursor_position(
        &self,
        agent: &AgentId,
        id: DocumentId,
        line: usize,
        column: usize,
    ) -> Result<()> {
        let handle = self.handle(id).await?;
        handle.authorize(agent, Need::Level(Permission::Read))?;

        if line == 0 || column == 0 {
            return Err(DocError::invalid("cursor line and column are 1-based"));
        }
        let max_line = handle.line_count.load(Ordering::Acquire).max(1);
        if line > max_line {
            return Err(DocError::out_of_range(format!(
                "cursor line {line} is beyond the last line ({max_line})"
            )));
        }

        handle.presence.update(agent.clone(), line, column);
        log::trace!("{agent} cursor at {line}:{column} in {id}");
        Ok(())
    }

    /// Live cursors on a document. Requires `Read`.
    pub async fn get_agent_presence(
        &self,
        agent: &AgentId,
        id: DocumentId,
    ) -> Result<Vec<PresenceView>> {
        let handle = self.handle(id).await?;
        handle.authorize(agent, Need::Level(Permission::Read))?;
        Ok(handle.presence.active())
    }

    /// Drop the caller's cursor. Returns whether one was present.
    pub async fn close_document(&self, agent: &AgentId, id: DocumentId) -> Result<bool> {
        let handle = self.handle(id).await?;
        let removed = handle.presence.remove(agent);
        log::trace!("{agent} closed {id} (presence removed: {removed})");
        Ok(removed)
    }

    /// Remove expired cursors on every document. Returns how many were dropped.
    pub async fn sweep_presence(&self) -> usize {
        let handles: Vec<Arc<DocumentHandle>> =
            self.documents.read().await.values().cloned().collect();
        let removed: usize = handles.iter().map(|h| h.presence.cleanup_idle().len()).sum();
        if removed > 0 {
            log::debug!("Presence sweep removed {removed} idle cursors");
        }
        removed
    }

    /// Run [`sweep_presence`](Self::sweep_presence) every `interval` until
    /// the engine is dropped.
    pub fn spawn_presence_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match engine.upgrade() {
                    Some(engine) => {
                        engine.sweep_presence().await;
                    }
                    None => break,
                }
            }
        })
    }

    // ─── History ──────────────────────────────────────────────────────

    /// Up to `limit` log entries, most recent first. Requires `Read`.
    pub async fn get_document_history(
        &self,
        agent: &AgentId,
        id: DocumentId,
        limit: usize,
    ) -> Result<Vec<Operation>> {
        let handle = self.handle(id).await?;
        let doc = self.read_locked(&handle, agent, Need::Level(Permission::Read)).await?;
        Ok(doc.history().recent(limit))
    }

    /// Content right after `version` was produced, rebuilt from the log.
    pub async fn get_document_at_version(
        &self,
        agent: &AgentId,
        id: DocumentId,
        version: u64,
    ) -> Result<Vec<String>> {
        let handle = self.handle(id).await?;
        let doc = self.read_locked(&handle, agent, Need::Level(Permission::Read)).await?;
        doc.lines_at(version)
    }

    // ─── Listing and administration ───────────────────────────────────

    /// Documents the caller can read, oldest first.
    pub async fn list_documents(&self, agent: &AgentId) -> Result<Vec<DocumentSummary>> {
        let documents = self.documents.read().await;
        let mut summaries: Vec<DocumentSummary> = documents
            .values()
            .filter(|h| !h.is_deleted())
            .filter_map(|h| {
                let permission = h.access.read().level(agent);
                permission.allows(Permission::Read).then(|| DocumentSummary {
                    document_id: h.id,
                    name: h.name.clone(),
                    owner: h.owner.clone(),
                    version: h.version.load(Ordering::Acquire),
                    line_count: h.line_count.load(Ordering::Acquire),
                    permission,
                    created_at_ms: h.created_at_ms,
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        Ok(summaries)
    }

    /// Grant, change or revoke (`Permission::None`) another agent's access.
    /// Owner only. Does not change the content version.
    pub async fn set_permission(
        &self,
        agent: &AgentId,
        id: DocumentId,
        target: AgentId,
        level: Permission,
    ) -> Result<()> {
        let handle = self.handle(id).await?;
        let doc = self.write_locked(&handle, agent, Need::Owner).await?;

        let mut access = handle.access.read().clone();
        access.set(target.clone(), level)?;
        self.persist(&doc.record(&access), doc.comments(), None)?;
        *handle.access.write() = access;

        log::info!("{agent} set {target} to {level} on document {id}");
        Ok(())
    }

    /// Delete a document with its history, comments and presence. Owner only.
    pub async fn delete_document(&self, agent: &AgentId, id: DocumentId) -> Result<()> {
        let handle = self.handle(id).await?;
        {
            let _doc = self.write_locked(&handle, agent, Need::Owner).await?;
            if let Some(storage) = &self.storage {
                storage.delete(id).map_err(|e| {
                    log::error!("Failed to delete document {id} from storage: {e}");
                    DocError::Storage(e)
                })?;
            }
            handle.deleted.store(true, Ordering::Release);
            handle.presence.clear();
        }
        self.documents.write().await.remove(&id);

        log::info!("{agent} deleted document {id}");
        Ok(())
    }

    // ─── Internals ────────────────────────────────────────────────────

    async fn handle(&self, id: DocumentId) -> Result<Arc<DocumentHandle>> {
        self.documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DocError::DocumentNotFound(id))
    }

    /// Await `acquire` for at most `lock_timeout`. Dropping the timed-out
    /// future drops the pending acquisition with it.
    async fn bounded<T>(&self, id: DocumentId, acquire: impl Future<Output = T>) -> Result<T> {
        let waited = self.config.lock_timeout;
        tokio::time::timeout(waited, acquire).await.map_err(|_| {
            log::warn!("Timed out after {waited:?} waiting for document {id}");
            DocError::Timeout { document_id: id, waited }
        })
    }

    // Access is checked before waiting (fail fast) and again under the lock,
    // since it may have changed while waiting.
    async fn read_locked<'a>(
        &self,
        handle: &'a DocumentHandle,
        agent: &AgentId,
        need: Need,
    ) -> Result<RwLockReadGuard<'a, Document>> {
        handle.authorize(agent, need)?;
        let guard = self.bounded(handle.id, handle.state.read()).await?;
        handle.authorize(agent, need)?;
        Ok(guard)
    }

    async fn write_locked<'a>(
        &self,
        handle: &'a DocumentHandle,
        agent: &AgentId,
        need: Need,
    ) -> Result<RwLockWriteGuard<'a, Document>> {
        handle.authorize(agent, need)?;
        let guard = self.bounded(handle.id, handle.state.write()).await?;
        handle.authorize(agent, need)?;
        Ok(guard)
    }

    /// Persist a staged mutation, then commit it in memory.
    fn apply(
        &self,
        handle: &DocumentHandle,
        doc: &mut Document,
        staged: Staged,
    ) -> Result<EditResult> {
        let record = {
            let access = handle.access.read();
            doc.staged_record(&staged, &access)
        };
        self.persist(&record, staged.comments(), Some(staged.operation()))?;

        let result = EditResult {
            document_id: handle.id,
            version: staged.version(),
            line_count: staged.line_count(),
            delta: staged.delta(),
        };
        doc.commit(staged)?;
        handle.publish(doc);
        Ok(result)
    }

    fn persist(
        &self,
        record: &DocumentRecord,
        comments: &[Comment],
        operation: Option<&Operation>,
    ) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        storage.commit(record, comments, operation).map_err(|e| {
            log::error!("Failed to persist document {} at v{}: {e}", record.id, record.version);
            DocError::Storage(e)
        })
    }
}
