//! Sync engine for the shared weekly plan.
//!
//! The plan is one document holding the meal library and the seven-day plan.
//! Every session keeps a local copy and writes the whole document back; the
//! store stamps each write with a [`ServerTimestamp`](crate::store::ServerTimestamp).
//!
//! # Saving
//!
//! - A session remembers the timestamp of the last record it loaded or wrote.
//!   If the stored record is newer, another session wrote in between.
//! - Background saves merge automatically: local meals and plan win, meals
//!   only the remote has are appended.
//! - Interactive saves ask a [`ConflictResolver`] to merge, overwrite or cancel.
//! - Every write runs in a store transaction that re-checks the timestamp.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use meal_planner::models::Meal;
//! use meal_planner::store::{DocumentStore, MemoryStore};
//! use meal_planner::sync::SyncEngine;
//!
//! # async fn demo() -> Result<(), meal_planner::sync::SyncError> {
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let engine = SyncEngine::builder(Some(store)).build();
//! engine.load().await;
//! engine.add_meal(Meal::new("Tacos", vec!["tortillas".into()]));
//! engine.flush().await?;
//! # Ok(())
//! # }
//! ```

mod conflict;
mod engine;
mod error;
mod merge;
mod sanitize;
mod scheduler;

pub use conflict::{detect_conflict, ConflictCheck};
pub use engine::{
    ConflictChoice, ConflictInfo, ConflictResolver, LoadResult, ReloadOutcome, SaveOptions,
    SaveReport, SyncEngine, SyncEngineBuilder, SyncStatus, DEFAULT_DOCUMENT_ID, DEFAULT_SOURCE,
};
pub use error::{ErrorKind, SyncError};
pub use merge::{merge, remote_only_count};
pub use sanitize::{sanitize, sanitize_meal, sanitize_meals, sanitize_plan, sanitize_snapshot};
pub use scheduler::{SaveFn, SaveScheduler, DEFAULT_QUIET_PERIOD};
