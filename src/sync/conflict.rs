//! Detecting whether the shared plan moved since this session last saw it.

use crate::models::Snapshot;
use crate::store::{DocumentStore, ServerTimestamp};

use super::sanitize::sanitize;

/// Outcome of a conflict check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    /// Sanitized remote snapshot, present when `has_conflict` is set.
    pub remote_snapshot: Option<Snapshot>,
    pub remote_timestamp: Option<ServerTimestamp>,
}

impl ConflictCheck {
    fn none() -> Self {
        Self::default()
    }
}

/// Checks whether the stored document is newer than `last_known`.
///
/// Opportunistic: with no observed timestamp there is nothing to compare
/// against, and read failures report no conflict so that saving stays
/// available.
pub async fn detect_conflict(
    store: &dyn DocumentStore,
    doc_id: &str,
    last_known: Option<ServerTimestamp>,
) -> ConflictCheck {
    let Some(last_known) = last_known else {
        return ConflictCheck::none();
    };

    match store.get(doc_id).await {
        Ok(Some(record)) if record.last_updated.is_newer_than(&last_known) => {
            tracing::info!(
                "Remote plan changed (remote {} > known {}, source {})",
                record.last_updated,
                last_known,
                record.source
            );
            ConflictCheck {
                has_conflict: true,
                remote_snapshot: Some(sanitize(&record.payload())),
                remote_timestamp: Some(record.last_updated),
            }
        }
        Ok(Some(record)) => ConflictCheck {
            has_conflict: false,
            remote_snapshot: None,
            remote_timestamp: Some(record.last_updated),
        },
        Ok(None) => ConflictCheck::none(),
        Err(e) => {
            tracing::warn!("Conflict check failed, continuing without it: {}", e);
            ConflictCheck::none()
        }
    }
}
