//! Document store adapters.
//!
//! The plan lives in a single logical document. A store exposes whole-record
//! reads and writes, a read-modify-write transaction, and separate backup
//! documents. Every write is stamped by the store with a [`ServerTimestamp`]
//! that orders it after all earlier writes.
//!
//! Two adapters are provided:
//! - [`MemoryStore`]: in-process, shared between engines through an `Arc`
//! - [`SqliteStore`]: a SQLite database file shared between processes

mod memory;
mod record;
mod sqlite;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub use memory::MemoryStore;
pub use record::{backup_id, BackupInfo, PendingRecord, RemoteRecord, ServerTimestamp};
pub use sqlite::SqliteStore;

/// What a transaction body decided after reading the current record.
#[derive(Debug)]
pub enum WriteDecision {
    Commit(PendingRecord),
    Abort,
}

/// Result of running a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed(ServerTimestamp),
    Aborted,
}

/// Transaction body: sees the current record (if any) and decides the write.
pub type TransactionFn = Box<dyn FnOnce(Option<&RemoteRecord>) -> WriteDecision + Send>;

/// Errors from a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}

/// A single-document store with transactions and store-assigned timestamps.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the current record. `Ok(None)` if the document was never written.
    async fn get(&self, doc_id: &str) -> Result<Option<RemoteRecord>, StoreError>;

    /// Atomically reads the current record, lets `f` decide, and applies the
    /// decision. Concurrent transactions on one store are serialized.
    async fn run_transaction(
        &self,
        doc_id: &str,
        f: TransactionFn,
    ) -> Result<TransactionOutcome, StoreError>;

    /// Writes a backup document under `backup_id`. Backups never touch the
    /// primary document.
    async fn backup(
        &self,
        backup_id: &str,
        record: PendingRecord,
    ) -> Result<ServerTimestamp, StoreError>;

    /// Lists backups taken of `doc_id`, oldest first.
    async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError>;

    /// Overwrites the document unconditionally.
    async fn set(
        &self,
        doc_id: &str,
        record: PendingRecord,
    ) -> Result<ServerTimestamp, StoreError> {
        match self
            .run_transaction(doc_id, Box::new(move |_| WriteDecision::Commit(record)))
            .await?
        {
            TransactionOutcome::Committed(ts) => Ok(ts),
            TransactionOutcome::Aborted => Err(StoreError::Unavailable(
                "unconditional write was aborted".to_string(),
            )),
        }
    }
}
