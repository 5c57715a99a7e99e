//! SQLite-backed document store.
//!
//! Documents live in one `documents` table keyed by `(kind, doc_id)`, with
//! the payload stored as JSON text. Writes run inside `BEGIN IMMEDIATE`
//! transactions so that separate processes sharing the database file
//! serialize their read-modify-write cycles.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::record::backup_prefix;
use super::{
    BackupInfo, DocumentStore, PendingRecord, RemoteRecord, ServerTimestamp, StoreError,
    TransactionFn, TransactionOutcome, WriteDecision,
};

const KIND_PRIMARY: &str = "primary";
const KIND_BACKUP: &str = "backup";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    meals: String,
    weekly_plan: String,
    last_updated: i64,
    version: i64,
    source: String,
}

impl DocumentRow {
    fn into_record(self, doc_id: &str) -> RemoteRecord {
        RemoteRecord {
            meals: parse_payload(doc_id, "meals", &self.meals),
            weekly_plan: parse_payload(doc_id, "weekly_plan", &self.weekly_plan),
            last_updated: ServerTimestamp::from_micros(self.last_updated),
            version: self.version.max(0) as u64,
            source: self.source,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BackupRow {
    doc_id: String,
    last_updated: i64,
    version: i64,
}

/// Unreadable payloads degrade to `null`; readers sanitize them to defaults.
fn parse_payload(doc_id: &str, column: &str, text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        tracing::warn!("Unreadable {} in document {}: {}", column, doc_id, e);
        Value::Null
    })
}

/// Document store backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!("Opened document store at {}", path.display());
        Ok(Self { pool })
    }

    async fn fetch(
        conn: &mut SqliteConnection,
        kind: &str,
        doc_id: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT meals, weekly_plan, last_updated, version, source FROM documents WHERE kind = ? AND doc_id = ?",
        )
        .bind(kind)
        .bind(doc_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|row| row.into_record(doc_id)))
    }

    async fn next_timestamp(conn: &mut SqliteConnection) -> Result<ServerTimestamp, StoreError> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(last_updated) FROM documents")
            .fetch_one(&mut *conn)
            .await?;
        Ok(ServerTimestamp::next_after(
            latest.map(ServerTimestamp::from_micros),
            Utc::now(),
        ))
    }

    async fn upsert(
        conn: &mut SqliteConnection,
        kind: &str,
        doc_id: &str,
        record: &RemoteRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (kind, doc_id, meals, weekly_plan, last_updated, version, source)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, doc_id) DO UPDATE SET
                meals = excluded.meals,
                weekly_plan = excluded.weekly_plan,
                last_updated = excluded.last_updated,
                version = excluded.version,
                source = excluded.source
            "#,
        )
        .bind(kind)
        .bind(doc_id)
        .bind(record.meals.to_string())
        .bind(record.weekly_plan.to_string())
        .bind(record.last_updated.as_micros())
        .bind(record.version as i64)
        .bind(&record.source)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Stamps and stores `pending` under `(kind, doc_id)`. Runs inside an
    /// open transaction.
    async fn write(
        conn: &mut SqliteConnection,
        kind: &str,
        doc_id: &str,
        pending: PendingRecord,
    ) -> Result<ServerTimestamp, StoreError> {
        let ts = Self::next_timestamp(conn).await?;
        Self::upsert(conn, kind, doc_id, &pending.into_record(ts)).await?;
        Ok(ts)
    }

    async fn transact(
        conn: &mut SqliteConnection,
        doc_id: &str,
        f: TransactionFn,
    ) -> Result<TransactionOutcome, StoreError> {
        let current = Self::fetch(conn, KIND_PRIMARY, doc_id).await?;
        match f(current.as_ref()) {
            WriteDecision::Commit(pending) => {
                let ts = Self::write(conn, KIND_PRIMARY, doc_id, pending).await?;
                Ok(TransactionOutcome::Committed(ts))
            }
            WriteDecision::Abort => Ok(TransactionOutcome::Aborted),
        }
    }

    async fn end_transaction(conn: &mut SqliteConnection, commit: bool) -> Result<(), StoreError> {
        let statement = if commit { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(statement).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, doc_id: &str) -> Result<Option<RemoteRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, KIND_PRIMARY, doc_id).await
    }

    async fn run_transaction(
        &self,
        doc_id: &str,
        f: TransactionFn,
    ) -> Result<TransactionOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::transact(&mut conn, doc_id, f).await {
            Ok(outcome) => {
                let commit = matches!(outcome, TransactionOutcome::Committed(_));
                Self::end_transaction(&mut conn, commit).await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = Self::end_transaction(&mut conn, false).await {
                    tracing::warn!("Rollback failed for {}: {}", doc_id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn backup(
        &self,
        backup_id: &str,
        record: PendingRecord,
    ) -> Result<ServerTimestamp, StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::write(&mut conn, KIND_BACKUP, backup_id, record).await {
            Ok(ts) => {
                Self::end_transaction(&mut conn, true).await?;
                Ok(ts)
            }
            Err(e) => {
                if let Err(rollback) = Self::end_transaction(&mut conn, false).await {
                    tracing::warn!("Rollback failed for {}: {}", backup_id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError> {
        let pattern = format!("{}%", backup_prefix(doc_id).replace('%', "\\%").replace('_', "\\_"));
        let rows: Vec<BackupRow> = sqlx::query_as(
            "SELECT doc_id, last_updated, version FROM documents WHERE kind = ? AND doc_id LIKE ? ESCAPE '\\' ORDER BY last_updated",
        )
        .bind(KIND_BACKUP)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BackupInfo {
                id: row.doc_id,
                last_updated: ServerTimestamp::from_micros(row.last_updated),
                version: row.version.max(0) as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Day, Meal, Snapshot};
    use tempfile::TempDir;

    async fn setup() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("plan.db"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn pending(version: u64) -> PendingRecord {
        let mut snapshot = Snapshot::default();
        let meal = Meal::new("Ramen", vec!["noodles".to_string()]).with_id(1);
        snapshot.add_meal(meal.clone());
        snapshot.weekly_plan.assign(Day::Monday, meal);
        PendingRecord::from_snapshot(&snapshot, version, "sqlite-test").unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("plan.db");
        SqliteStore::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _temp) = setup().await;
        assert!(store.get("weekly-plan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let (store, _temp) = setup().await;
        let ts = store.set("weekly-plan", pending(1)).await.unwrap();

        let record = store.get("weekly-plan").await.unwrap().unwrap();
        assert_eq!(record.last_updated, ts);
        assert_eq!(record.version, 1);
        assert_eq!(record.source, "sqlite-test");
        assert_eq!(record.meals[0]["name"], "Ramen");
        assert_eq!(record.weekly_plan["Monday"]["id"], 1);
    }

    #[tokio::test]
    async fn test_overwrite_advances_timestamp() {
        let (store, _temp) = setup().await;
        let first = store.set("weekly-plan", pending(1)).await.unwrap();
        let second = store.set("weekly-plan", pending(2)).await.unwrap();
        assert!(second.is_newer_than(&first));

        let record = store.get("weekly-plan").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_aborted_transaction_rolls_back() {
        let (store, _temp) = setup().await;
        let ts = store.set("weekly-plan", pending(1)).await.unwrap();

        let outcome = store
            .run_transaction("weekly-plan", Box::new(|_| WriteDecision::Abort))
            .await
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::Aborted);

        let record = store.get("weekly-plan").await.unwrap().unwrap();
        assert_eq!(record.last_updated, ts);

        // The connection is usable again after the rollback
        store.set("weekly-plan", pending(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_payload_degrades_to_null() {
        let (store, _temp) = setup().await;
        sqlx::query(
            "INSERT INTO documents (kind, doc_id, meals, weekly_plan, last_updated, version, source) VALUES ('primary', 'weekly-plan', 'not json', '{}', 1, 1, 'x')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let record = store.get("weekly-plan").await.unwrap().unwrap();
        assert!(record.meals.is_null());
        assert!(record.weekly_plan.is_object());
    }

    #[tokio::test]
    async fn test_backups_listed_per_document() {
        let (store, _temp) = setup().await;
        store.set("weekly-plan", pending(1)).await.unwrap();
        store
            .backup("weekly-plan-backup-20250301T080000.000000Z", pending(1))
            .await
            .unwrap();
        store
            .backup("weekly-plan-backup-20250302T080000.000000Z", pending(2))
            .await
            .unwrap();
        store
            .backup("other-backup-20250302T080000.000000Z", pending(1))
            .await
            .unwrap();

        let backups = store.list_backups("weekly-plan").await.unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[1].version, 2);

        // Backups never replace the primary record
        let record = store.get("weekly-plan").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
    }
}
