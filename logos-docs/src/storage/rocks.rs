//! RocksDB-backed document store.
//!
//! Column families:
//! - `documents`  — [`DocumentRecord`] with the current line snapshot, keyed by doc_id
//! - `operations` — log entries, keyed by doc_id:sequence (big-endian, so scans are ordered)
//! - `comments`   — the full comment set of a document, keyed by doc_id
//!
//! All values are [`codec`] frames. Each engine commit is one `WriteBatch`.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{codec, DocumentRecord, DocumentStorage, PersistedDocument, StoreError};
use crate::comments::Comment;
use crate::history::Operation;
use crate::ids::DocumentId;

const CF_DOCUMENTS: &str = "documents";
const CF_OPERATIONS: &str = "operations";
const CF_COMMENTS: &str = "comments";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_OPERATIONS, CF_COMMENTS];

/// Length of an operation key: doc_id (16) + sequence (8).
const OPERATION_KEY_LEN: usize = 24;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync every commit (default: true, a commit is acknowledged only once durable)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logos_docs_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches, no fsync. For tests only.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// RocksDB-backed implementation of [`DocumentStorage`].
pub struct DocumentStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl DocumentStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened document store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        // Values are already LZ4 frames
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS | CF_COMMENTS => {
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_OPERATIONS => {
                // Many small appends, prefix-scanned by doc_id
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            _ => {}
        }

        opts
    }

    // ─── Records ──────────────────────────────────────────────────────

    /// Load a document record.
    pub fn load_record(&self, id: DocumentId) -> Result<DocumentRecord, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => codec::decode(&bytes),
            None => Err(StoreError::NotFound(id)),
        }
    }

    pub fn document_exists(&self, id: DocumentId) -> Result<bool, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        Ok(self.db.get_cf(&cf, id.as_bytes())?.is_some())
    }

    /// IDs of every stored document, in key order.
    pub fn list_documents(&self) -> Result<Vec<DocumentId>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let mut ids = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            let bytes: [u8; 16] = key
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Deserialization("invalid document key".into()))?;
            ids.push(DocumentId::from_uuid(Uuid::from_bytes(bytes)));
        }

        Ok(ids)
    }

    // ─── Comments ─────────────────────────────────────────────────────

    /// Load the comment set of a document (empty if none was stored).
    pub fn load_comments(&self, id: DocumentId) -> Result<Vec<Comment>, StoreError> {
        let cf = self.cf(CF_COMMENTS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => codec::decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    // ─── Operations ───────────────────────────────────────────────────

    /// Load log entries with `sequence >= since`, in sequence order.
    pub fn load_operations_since(
        &self,
        id: DocumentId,
        since: u64,
    ) -> Result<Vec<Operation>, StoreError> {
        let cf = self.cf(CF_OPERATIONS)?;
        let start_key = Self::operation_key(id, since);

        let mut ops = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start_key, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if key.len() != OPERATION_KEY_LEN || &key[..16] != id.as_bytes() {
                break;
            }
            let op: Operation = codec::decode(&value)?;
            let mut seq_buf = [0u8; 8];
            seq_buf.copy_from_slice(&key[16..]);
            if op.sequence != u64::from_be_bytes(seq_buf) {
                return Err(StoreError::Corrupted {
                    document_id: id,
                    reason: format!("operation {} stored under a different key", op.sequence),
                });
            }
            ops.push(op);
        }

        Ok(ops)
    }

    /// Load the full log of a document.
    pub fn load_operations(&self, id: DocumentId) -> Result<Vec<Operation>, StoreError> {
        self.load_operations_since(id, 0)
    }

    // ─── Writes ───────────────────────────────────────────────────────

    /// Atomically store record, comments and (optionally) one new log entry.
    pub fn commit(
        &self,
        record: &DocumentRecord,
        comments: &[Comment],
        operation: Option<&Operation>,
    ) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_comments = self.cf(CF_COMMENTS)?;
        let cf_ops = self.cf(CF_OPERATIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_docs, record.id.as_bytes(), codec::encode(record)?);
        batch.put_cf(&cf_comments, record.id.as_bytes(), codec::encode(&comments)?);
        if let Some(op) = operation {
            batch.put_cf(
                &cf_ops,
                Self::operation_key(record.id, op.sequence),
                codec::encode(op)?,
            );
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Delete a document, its comments and its whole log.
    pub fn delete_document(&self, id: DocumentId) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_comments = self.cf(CF_COMMENTS)?;
        let cf_ops = self.cf(CF_OPERATIONS)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_docs, id.as_bytes());
        batch.delete_cf(&cf_comments, id.as_bytes());

        let start_key = Self::operation_key(id, 0);
        let iter = self
            .db
            .iterator_cf(&cf_ops, IteratorMode::From(&start_key, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if key.len() != OPERATION_KEY_LEN || &key[..16] != id.as_bytes() {
                break;
            }
            batch.delete_cf(&cf_ops, &key);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family '{name}' not found")))
    }

    /// doc_id (16 bytes) + sequence (8 bytes big-endian).
    fn operation_key(id: DocumentId, sequence: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(OPERATION_KEY_LEN);
        key.extend_from_slice(id.as_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }
}

impl DocumentStorage for DocumentStore {
    fn load_documents(&self) -> Result<Vec<PersistedDocument>, StoreError> {
        let mut documents = Vec::new();
        for id in self.list_documents()? {
            let record = self.load_record(id)?;
            let comments = self.load_comments(id)?;
            let operations = self.load_operations(id)?;
            log::debug!(
                "Loaded document {id}: v{}, {} operations, {} comments",
                record.version,
                operations.len(),
                comments.len()
            );
            documents.push(PersistedDocument { record, comments, operations });
        }
        Ok(documents)
    }

    fn commit(
        &self,
        record: &DocumentRecord,
        comments: &[Comment],
        operation: Option<&Operation>,
    ) -> Result<(), StoreError> {
        DocumentStore::commit(self, record, comments, operation)
    }

    fn delete(&self, id: DocumentId) -> Result<(), StoreError> {
        self.delete_document(id)
    }
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
