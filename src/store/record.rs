use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Snapshot;

/// Store-assigned write time in microseconds since the epoch.
///
/// Strictly increasing across writes to one store, so ordering two
/// timestamps orders the writes that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTimestamp(i64);

impl ServerTimestamp {
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn is_newer_than(&self, other: &ServerTimestamp) -> bool {
        self.0 > other.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.0).unwrap_or_default()
    }

    /// Next timestamp for a store whose latest write was `previous`.
    pub fn next_after(previous: Option<ServerTimestamp>, now: DateTime<Utc>) -> Self {
        let now = now.timestamp_micros();
        match previous {
            Some(prev) if prev.0 >= now => Self(prev.0 + 1),
            _ => Self(now),
        }
    }
}

impl std::fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// The stored plan document.
///
/// Payload fields are kept untyped: other writers may have stored anything,
/// and readers sanitize before use.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub meals: Value,
    pub weekly_plan: Value,
    pub last_updated: ServerTimestamp,
    pub version: u64,
    pub source: String,
}

impl RemoteRecord {
    /// The `{meals, weeklyPlan}` payload as a single value.
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "meals": self.meals,
            "weeklyPlan": self.weekly_plan,
        })
    }
}

/// A whole-document write waiting for its store timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub meals: Value,
    pub weekly_plan: Value,
    pub version: u64,
    pub source: String,
}

impl PendingRecord {
    /// Serializes a snapshot into a record body.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        version: u64,
        source: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            meals: serde_json::to_value(&snapshot.meals)?,
            weekly_plan: serde_json::to_value(&snapshot.weekly_plan)?,
            version,
            source: source.into(),
        })
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn into_record(self, last_updated: ServerTimestamp) -> RemoteRecord {
        RemoteRecord {
            meals: self.meals,
            weekly_plan: self.weekly_plan,
            last_updated,
            version: self.version,
            source: self.source,
        }
    }
}

/// Summary of a backup document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub last_updated: ServerTimestamp,
    pub version: u64,
}

/// Identifier for a backup of `doc_id` taken at `now`.
pub fn backup_id(doc_id: &str, now: DateTime<Utc>) -> String {
    format!("{}{}", backup_prefix(doc_id), now.format("%Y%m%dT%H%M%S%.6fZ"))
}

pub(crate) fn backup_prefix(doc_id: &str) -> String {
    format!("{}-backup-", doc_id)
}
