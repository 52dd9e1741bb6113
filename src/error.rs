//! Error types shared by every layer of the engine.

use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur while reading, writing or locking pages.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Transaction {tid} aborted: lock on {page_id} not granted within wait budget")]
    TransactionAborted {
        tid: TransactionId,
        page_id: PageId,
    },

    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Page {0} is full")]
    PageFull(PageId),

    #[error("Slot {slot} on page {page_id} is already empty")]
    SlotAlreadyEmpty { page_id: PageId, slot: u16 },

    #[error("Tuple is not stored on page {page_id}")]
    NotOnThisPage { page_id: PageId },

    #[error("Buffer pool is full: all {capacity} cached pages are dirty")]
    BufferPoolFull { capacity: usize },

    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    #[error("Table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Whether the caller may roll back and run the whole transaction again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::TransactionAborted { .. })
    }
}

impl From<bincode::Error> for DbError {
    fn from(err: bincode::Error) -> Self {
        DbError::Catalog(err.to_string())
    }
}

/// Result type for engine operations.
pub type DbResult<T> = Result<T, DbError>;
