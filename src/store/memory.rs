//! In-process document store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::record::backup_prefix;
use super::{
    BackupInfo, DocumentStore, PendingRecord, RemoteRecord, ServerTimestamp, StoreError,
    TransactionFn, TransactionOutcome, WriteDecision,
};

#[derive(Debug, Default)]
struct Documents {
    primary: HashMap<String, RemoteRecord>,
    backups: BTreeMap<String, RemoteRecord>,
    clock: Option<ServerTimestamp>,
}

impl Documents {
    fn next_timestamp(&mut self) -> ServerTimestamp {
        let ts = ServerTimestamp::next_after(self.clock, Utc::now());
        self.clock = Some(ts);
        ts
    }
}

/// Document store held in memory.
///
/// Share one instance between engines (via `Arc`) to simulate several
/// sessions editing the same plan.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc_id: &str) -> Result<Option<RemoteRecord>, StoreError> {
        let documents = self.documents.lock().await;
        Ok(documents.primary.get(doc_id).cloned())
    }

    async fn run_transaction(
        &self,
        doc_id: &str,
        f: TransactionFn,
    ) -> Result<TransactionOutcome, StoreError> {
        let mut documents = self.documents.lock().await;
        match f(documents.primary.get(doc_id)) {
            WriteDecision::Commit(pending) => {
                let ts = documents.next_timestamp();
                documents
                    .primary
                    .insert(doc_id.to_string(), pending.into_record(ts));
                Ok(TransactionOutcome::Committed(ts))
            }
            WriteDecision::Abort => Ok(TransactionOutcome::Aborted),
        }
    }

    async fn backup(
        &self,
        backup_id: &str,
        record: PendingRecord,
    ) -> Result<ServerTimestamp, StoreError> {
        let mut documents = self.documents.lock().await;
        let ts = documents.next_timestamp();
        documents
            .backups
            .insert(backup_id.to_string(), record.into_record(ts));
        Ok(ts)
    }

    async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError> {
        let documents = self.documents.lock().await;
        let prefix = backup_prefix(doc_id);
        let mut backups: Vec<BackupInfo> = documents
            .backups
            .iter()
            .filter(|(id, _)| id.starts_with(&prefix))
            .map(|(id, record)| BackupInfo {
                id: id.clone(),
                last_updated: record.last_updated,
                version: record.version,
            })
            .collect();
        backups.sort_by_key(|b| b.last_updated);
        Ok(backups)
    }
}
