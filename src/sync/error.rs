//! Sync error types.

use thiserror::Error;

use crate::store::StoreError;

/// Coarse category of a sync failure, for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No document store is configured.
    NotConfigured,
    /// The store could not be reached or failed the request.
    Network,
    /// Another session changed the plan.
    Conflict,
    /// Anything else.
    Other,
}

/// Errors that can occur during sync engine operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cloud sync is not configured. Set sync.database_path in the config file.")]
    NotConfigured,

    #[error("Could not read the shared plan: {0}")]
    Fetch(#[source] StoreError),

    #[error("Could not write the shared plan: {0}")]
    Store(#[source] StoreError),

    #[error("Plan data could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("The shared plan was changed by another session while saving")]
    TransactionConflict,

    #[error("The shared plan was changed by another session; save cancelled")]
    ConflictUnresolved,

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("There are unsaved local changes; confirm to discard them")]
    PendingChanges,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotConfigured => ErrorKind::NotConfigured,
            SyncError::Fetch(_) | SyncError::Store(_) => ErrorKind::Network,
            SyncError::TransactionConflict | SyncError::ConflictUnresolved => {
                ErrorKind::Conflict
            }
            SyncError::Serialization(_)
            | SyncError::SaveInProgress
            | SyncError::PendingChanges => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_distinguish_user_facing_cases() {
        assert_eq!(SyncError::NotConfigured.kind(), ErrorKind::NotConfigured);
        assert_eq!(
            SyncError::Fetch(StoreError::Unavailable("offline".into())).kind(),
            ErrorKind::Network
        );
        assert_eq!(SyncError::TransactionConflict.kind(), ErrorKind::Conflict);
        assert_eq!(SyncError::ConflictUnresolved.kind(), ErrorKind::Conflict);
        assert_eq!(SyncError::SaveInProgress.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_display_includes_source() {
        let err = SyncError::Store(StoreError::Unavailable("offline".into()));
        assert!(err.to_string().contains("offline"));
    }
}
