//! Sync engine: keeps the local plan and the shared document in step.
//!
//! The engine owns the local [`Snapshot`], the sync status flags and the
//! debounced save timer. All store access goes through the injected
//! [`DocumentStore`]; without one the engine works local-only and every
//! remote operation reports [`SyncError::NotConfigured`].
//!
//! Saving follows a fixed order: conflict check, optional merge, sanitize,
//! serialize, transactional write, status update. At most one save runs at a
//! time; the `saving` flag is claimed before the first await.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use crate::models::{Day, Meal, MealId, Snapshot, WeeklyPlan};
use crate::store::{
    backup_id, BackupInfo, DocumentStore, PendingRecord, ServerTimestamp, TransactionFn,
    TransactionOutcome, WriteDecision,
};

use super::conflict::detect_conflict;
use super::error::SyncError;
use super::merge::{merge, remote_only_count};
use super::sanitize::{sanitize, sanitize_snapshot};
use super::scheduler::{SaveFn, SaveScheduler, DEFAULT_QUIET_PERIOD};

/// Default id of the shared plan document.
pub const DEFAULT_DOCUMENT_ID: &str = "weekly-plan";

/// Default source tag written with every record.
pub const DEFAULT_SOURCE: &str = "meal-planner";

/// Options for a single save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Merge conflicts automatically and log failures instead of reporting them loudly.
    pub silent: bool,
    /// Skip conflict checks and overwrite the shared plan.
    pub force_overwrite: bool,
}

impl SaveOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            force_overwrite: false,
        }
    }

    pub fn interactive() -> Self {
        Self::default()
    }

    pub fn with_force_overwrite(mut self, force_overwrite: bool) -> Self {
        self.force_overwrite = force_overwrite;
        self
    }
}

/// What the user chose when an interactive save hit a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep local edits and add meals that only exist remotely.
    Merge,
    /// Replace the shared plan with the local one.
    Overwrite,
    /// Abandon this save.
    Cancel,
}

/// Details handed to a [`ConflictResolver`].
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub local: Snapshot,
    pub remote: Snapshot,
    pub remote_timestamp: Option<ServerTimestamp>,
    /// Meals the remote has that local does not.
    pub remote_only_meals: usize,
    /// The save was started by the debounce timer, not by the user.
    pub background: bool,
}

/// Decision point for interactive saves that detect a conflict.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflict: &ConflictInfo) -> ConflictChoice;
}

impl ConflictResolver for ConflictChoice {
    fn resolve(&self, _conflict: &ConflictInfo) -> ConflictChoice {
        *self
    }
}

impl<F> ConflictResolver for F
where
    F: Fn(&ConflictInfo) -> ConflictChoice + Send + Sync,
{
    fn resolve(&self, conflict: &ConflictInfo) -> ConflictChoice {
        self(conflict)
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub timestamp: ServerTimestamp,
    pub version: u64,
    /// Remote meals were merged in before writing.
    pub merged: bool,
    /// The write was retried after the plan changed mid-save.
    pub retried: bool,
}

/// Data returned by [`SyncEngine::load`]. `None` means "keep what you have".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadResult {
    pub meals: Option<Vec<Meal>>,
    pub weekly_plan: Option<WeeklyPlan>,
    pub timestamp: Option<ServerTimestamp>,
}

/// Result of [`SyncEngine::force_reload`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    Reloaded {
        meals: usize,
        timestamp: ServerTimestamp,
    },
    NoRemoteData,
}

/// Snapshot of the engine's status flags, for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub configured: bool,
    pub saving: bool,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_known_remote: Option<ServerTimestamp>,
    pub remote_version: Option<u64>,
    pub conflict_detected: bool,
    pub pending_changes: bool,
    pub initial_load_complete: bool,
    pub save_scheduled: bool,
}

#[derive(Debug, Default)]
struct SyncState {
    saving: bool,
    last_saved: Option<DateTime<Utc>>,
    last_known_remote: Option<ServerTimestamp>,
    remote_version: Option<u64>,
    conflict_detected: bool,
    pending_changes: bool,
    initial_load_complete: bool,
    /// Bumped on every local mutation; a save only clears `pending_changes`
    /// if no mutation happened while it was running.
    edit_generation: u64,
}

/// Clears the `saving` flag when a save ends, however it ends.
struct SavingGuard<'a> {
    inner: &'a EngineInner,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.inner.state().saving = false;
        self.inner.save_finished.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct EngineInner {
    store: Option<Arc<dyn DocumentStore>>,
    doc_id: String,
    source: String,
    resolver: Arc<dyn ConflictResolver>,
    state: Mutex<SyncState>,
    local: Mutex<Snapshot>,
    save_finished: Notify,
}

impl EngineInner {
    fn state(&self) -> MutexGuard<'_, SyncState> {
        lock(&self.state)
    }

    fn local(&self) -> MutexGuard<'_, Snapshot> {
        lock(&self.local)
    }

    fn store(&self) -> Result<Arc<dyn DocumentStore>, SyncError> {
        self.store.clone().ok_or(SyncError::NotConfigured)
    }

    fn begin_save(&self) -> Result<SavingGuard<'_>, SyncError> {
        let mut state = self.state();
        if state.saving {
            tracing::debug!("Save rejected: another save is in flight");
            return Err(SyncError::SaveInProgress);
        }
        state.saving = true;
        Ok(SavingGuard { inner: self })
    }

    /// Waits until no save is in flight. A write that has started always
    /// runs to completion.
    async fn wait_until_idle(&self) {
        loop {
            let finished = self.save_finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            if !self.state().saving {
                return;
            }
            finished.await;
        }
    }

    fn mark_pending_changes(&self) -> bool {
        let mut state = self.state();
        if !state.initial_load_complete {
            return false;
        }
        state.pending_changes = true;
        state.edit_generation += 1;
        true
    }

    fn report(&self, error: SyncError, options: SaveOptions) -> SyncError {
        if options.silent {
            tracing::warn!("Background save failed: {}", error);
        } else {
            tracing::error!("Save failed: {}", error);
        }
        error
    }

    async fn load(&self) -> LoadResult {
        let Some(store) = self.store.clone() else {
            tracing::info!("Sync not configured, keeping local data");
            self.state().initial_load_complete = true;
            return LoadResult::default();
        };

        let record = match store.get(&self.doc_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!("No shared plan found for {}, keeping local data", self.doc_id);
                self.state().initial_load_complete = true;
                return LoadResult::default();
            }
            Err(e) => {
                tracing::warn!("Failed to load shared plan, keeping local data: {}", e);
                self.state().initial_load_complete = true;
                return LoadResult::default();
            }
        };

        let snapshot = sanitize(&record.payload());
        let result = LoadResult {
            meals: (!snapshot.meals.is_empty()).then_some(snapshot.meals),
            weekly_plan: record.weekly_plan.is_object().then_some(snapshot.weekly_plan),
            timestamp: Some(record.last_updated),
        };

        {
            let mut local = self.local();
            if let Some(meals) = &result.meals {
                local.meals = meals.clone();
            }
            if let Some(plan) = &result.weekly_plan {
                local.weekly_plan = plan.clone();
            }
        }

        let mut state = self.state();
        state.last_known_remote = Some(record.last_updated);
        state.last_saved = Some(record.last_updated.to_datetime());
        state.remote_version = Some(record.version);
        state.initial_load_complete = true;
        tracing::info!(
            "Loaded shared plan (version {}, updated {})",
            record.version,
            record.last_updated
        );

        result
    }

    async fn save(
        &self,
        meals: Option<Vec<Meal>>,
        weekly_plan: Option<WeeklyPlan>,
        options: SaveOptions,
    ) -> Result<SaveReport, SyncError> {
        let _saving = self.begin_save()?;
        let store = self.store().map_err(|e| self.report(e, options))?;

        let mut snapshot = {
            let local = self.local();
            Snapshot {
                meals: meals.unwrap_or_else(|| local.meals.clone()),
                weekly_plan: weekly_plan.unwrap_or_else(|| local.weekly_plan.clone()),
            }
        };
        let generation = self.state().edit_generation;
        let background = options.silent;

        let mut options = options;
        let mut merged = false;
        let mut retried = false;

        loop {
            if !options.force_overwrite {
                let last_known = self.state().last_known_remote;
                let check = detect_conflict(store.as_ref(), &self.doc_id, last_known).await;
                if check.has_conflict {
                    self.state().conflict_detected = true;
                    let remote = check.remote_snapshot.unwrap_or_default();

                    let choice = if options.silent {
                        ConflictChoice::Merge
                    } else {
                        self.resolver.resolve(&ConflictInfo {
                            remote_only_meals: remote_only_count(&snapshot, &remote),
                            local: snapshot.clone(),
                            remote: remote.clone(),
                            remote_timestamp: check.remote_timestamp,
                            background,
                        })
                    };

                    match choice {
                        ConflictChoice::Merge => {
                            tracing::info!("Merging remote changes before save");
                            snapshot = merge(&snapshot, &remote);
                            merged = true;
                        }
                        ConflictChoice::Overwrite => {
                            tracing::info!("Overwriting remote changes");
                        }
                        ConflictChoice::Cancel => {
                            return Err(self.report(SyncError::ConflictUnresolved, options));
                        }
                    }
                    options.force_overwrite = true;
                }
            }

            let clean = sanitize_snapshot(&snapshot);
            let pending = PendingRecord::from_snapshot(&clean, 0, self.source.as_str())
                .map_err(|e| self.report(SyncError::Serialization(e), options))?;

            match self
                .write(store.as_ref(), pending, options.force_overwrite)
                .await
            {
                Ok((timestamp, version)) => {
                    self.commit(timestamp, version, generation, merged.then_some(&clean));
                    tracing::info!("Saved shared plan (version {}, {})", version, timestamp);
                    return Ok(SaveReport {
                        timestamp,
                        version,
                        merged,
                        retried,
                    });
                }
                Err(SyncError::TransactionConflict) if !retried => {
                    tracing::warn!("Shared plan changed during save, retrying once");
                    retried = true;
                    options = SaveOptions::interactive();
                    snapshot = clean;
                }
                Err(e) => return Err(self.report(e, options)),
            }
        }
    }

    /// Writes `pending` in a transaction. Unless `force_overwrite`, aborts if
    /// the stored record is newer than the last one this session observed.
    async fn write(
        &self,
        store: &dyn DocumentStore,
        pending: PendingRecord,
        force_overwrite: bool,
    ) -> Result<(ServerTimestamp, u64), SyncError> {
        let last_known = self.state().last_known_remote;
        let version = Arc::new(AtomicU64::new(0));
        let chosen_version = Arc::clone(&version);

        let body: TransactionFn = Box::new(move |current| {
            if !force_overwrite {
                if let (Some(current), Some(known)) = (current, last_known) {
                    if current.last_updated.is_newer_than(&known) {
                        return WriteDecision::Abort;
                    }
                }
            }
            let next = current.map_or(0, |record| record.version) + 1;
            chosen_version.store(next, Ordering::SeqCst);
            WriteDecision::Commit(pending.with_version(next))
        });

        match store.run_transaction(&self.doc_id, body).await {
            Ok(TransactionOutcome::Committed(ts)) => Ok((ts, version.load(Ordering::SeqCst))),
            Ok(TransactionOutcome::Aborted) => Err(SyncError::TransactionConflict),
            Err(e) => Err(SyncError::Store(e)),
        }
    }

    fn commit(
        &self,
        timestamp: ServerTimestamp,
        version: u64,
        generation: u64,
        merged: Option<&Snapshot>,
    ) {
        {
            let mut state = self.state();
            state.last_saved = Some(timestamp.to_datetime());
            state.last_known_remote = Some(timestamp);
            state.remote_version = Some(version);
            state.conflict_detected = false;
            if state.edit_generation == generation {
                state.pending_changes = false;
            }
        }

        if let Some(written) = merged {
            let mut local = self.local();
            let merged = merge(&local, written);
            *local = merged;
        }
    }

    async fn force_reload(&self, discard_pending: bool) -> Result<ReloadOutcome, SyncError> {
        let store = self.store()?;
        if self.state().pending_changes && !discard_pending {
            return Err(SyncError::PendingChanges);
        }

        let record = match store.get(&self.doc_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(ReloadOutcome::NoRemoteData),
            Err(e) => {
                tracing::error!("Failed to reload shared plan: {}", e);
                return Err(SyncError::Fetch(e));
            }
        };

        let snapshot = sanitize(&record.payload());
        let meals = snapshot.meals.len();
        {
            let mut local = self.local();
            if record.meals.is_array() {
                local.meals = snapshot.meals;
            }
            if record.weekly_plan.is_object() {
                local.weekly_plan = snapshot.weekly_plan;
            }
        }

        let mut state = self.state();
        state.last_known_remote = Some(record.last_updated);
        state.last_saved = Some(record.last_updated.to_datetime());
        state.remote_version = Some(record.version);
        state.pending_changes = false;
        state.conflict_detected = false;
        state.initial_load_complete = true;
        state.edit_generation += 1;
        tracing::info!("Reloaded shared plan (version {})", record.version);

        Ok(ReloadOutcome::Reloaded {
            meals,
            timestamp: record.last_updated,
        })
    }

    async fn create_backup(&self) -> Result<BackupInfo, SyncError> {
        let store = self.store()?;
        let snapshot = sanitize_snapshot(&self.local());
        let version = self.state().remote_version.unwrap_or(0);
        let pending = PendingRecord::from_snapshot(&snapshot, version, self.source.as_str())?;

        let id = backup_id(&self.doc_id, Utc::now());
        let last_updated = store.backup(&id, pending).await.map_err(|e| {
            tracing::error!("Backup failed: {}", e);
            SyncError::Store(e)
        })?;
        tracing::info!("Created backup {}", id);

        Ok(BackupInfo {
            id,
            last_updated,
            version,
        })
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    doc_id: String,
    source: String,
    quiet_period: Duration,
    resolver: Arc<dyn ConflictResolver>,
    initial: Snapshot,
}

impl SyncEngineBuilder {
    pub fn document_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = doc_id.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Local data to start from before the first load.
    pub fn initial_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.initial = snapshot;
        self
    }

    pub fn build(self) -> SyncEngine {
        let inner = Arc::new(EngineInner {
            store: self.store,
            doc_id: self.doc_id,
            source: self.source,
            resolver: self.resolver,
            state: Mutex::new(SyncState::default()),
            local: Mutex::new(self.initial),
            save_finished: Notify::new(),
        });

        let save_inner = Arc::clone(&inner);
        let save: SaveFn = Arc::new(move |snapshot: Snapshot| -> BoxFuture<'static, ()> {
            let inner = Arc::clone(&save_inner);
            Box::pin(async move {
                let Snapshot { meals, weekly_plan } = snapshot;
                match inner
                    .save(Some(meals), Some(weekly_plan), SaveOptions::silent())
                    .await
                {
                    Ok(report) => {
                        tracing::debug!("Debounced save committed version {}", report.version)
                    }
                    Err(SyncError::SaveInProgress) => {
                        tracing::warn!("Debounced save skipped: another save is in flight")
                    }
                    Err(_) => {}
                }
            })
        });

        SyncEngine {
            scheduler: SaveScheduler::new(self.quiet_period, save),
            inner,
        }
    }
}

/// Orchestrates loading, saving, conflict handling and backups for one
/// session.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    scheduler: SaveScheduler,
}

impl SyncEngine {
    /// Starts building an engine. `None` runs local-only.
    pub fn builder(store: Option<Arc<dyn DocumentStore>>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store,
            doc_id: DEFAULT_DOCUMENT_ID.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            quiet_period: DEFAULT_QUIET_PERIOD,
            resolver: Arc::new(ConflictChoice::Cancel),
            initial: Snapshot::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.store.is_some()
    }

    pub fn document_id(&self) -> &str {
        &self.inner.doc_id
    }

    /// Fetches the shared plan and adopts it locally. Never fails: store
    /// problems leave local data in place.
    pub async fn load(&self) -> LoadResult {
        self.inner.load().await
    }

    /// Saves `meals`/`weekly_plan` (defaulting to the local data).
    ///
    /// Fails immediately with [`SyncError::SaveInProgress`] if another save
    /// is running.
    pub async fn save(
        &self,
        meals: Option<Vec<Meal>>,
        weekly_plan: Option<WeeklyPlan>,
        options: SaveOptions,
    ) -> Result<SaveReport, SyncError> {
        if meals.is_none() && weekly_plan.is_none() {
            self.scheduler.cancel();
        }
        self.inner.save(meals, weekly_plan, options).await
    }

    /// Saves local changes now if there are any.
    ///
    /// A save already in flight (such as a debounced one) is awaited first;
    /// edits it did not include are then saved again.
    pub async fn flush(&self) -> Result<Option<SaveReport>, SyncError> {
        self.scheduler.cancel();
        loop {
            self.inner.wait_until_idle().await;
            if !self.inner.state().pending_changes {
                return Ok(None);
            }
            match self
                .inner
                .save(None, None, SaveOptions::interactive())
                .await
            {
                // A timer fired just before the cancel; wait for it too
                Err(SyncError::SaveInProgress) => continue,
                result => return result.map(Some),
            }
        }
    }

    /// Replaces local data with the shared plan.
    ///
    /// With pending local changes this fails with
    /// [`SyncError::PendingChanges`] unless `discard_pending` is set.
    pub async fn force_reload(&self, discard_pending: bool) -> Result<ReloadOutcome, SyncError> {
        let outcome = self.inner.force_reload(discard_pending).await?;
        self.scheduler.cancel();
        Ok(outcome)
    }

    /// Writes the sanitized local data to a new timestamped backup document.
    pub async fn create_backup(&self) -> Result<BackupInfo, SyncError> {
        self.inner.create_backup().await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, SyncError> {
        let store = self.inner.store()?;
        store
            .list_backups(&self.inner.doc_id)
            .await
            .map_err(SyncError::Fetch)
    }

    /// Flags unsaved local edits. Ignored until the first load completes.
    pub fn mark_pending_changes(&self) -> bool {
        self.inner.mark_pending_changes()
    }

    /// Schedules a debounced save of `snapshot`.
    pub fn schedule_save(&self, snapshot: Snapshot) {
        self.scheduler.schedule(snapshot);
    }

    /// Cancels any scheduled save.
    pub fn shutdown(&self) {
        self.scheduler.cancel();
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.inner.state();
        SyncStatus {
            configured: self.inner.store.is_some(),
            saving: state.saving,
            last_saved: state.last_saved,
            last_known_remote: state.last_known_remote,
            remote_version: state.remote_version,
            conflict_detected: state.conflict_detected,
            pending_changes: state.pending_changes,
            initial_load_complete: state.initial_load_complete,
            save_scheduled: self.scheduler.is_pending(),
        }
    }

    /// Copy of the local data.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.local().clone()
    }

    // Local mutations. Each updates local data in one step, flags pending
    // changes and schedules a debounced save.

    pub fn add_meal(&self, meal: Meal) -> Option<Meal> {
        self.mutate(|local| {
            let added = meal.clone();
            local.add_meal(meal).then_some(added)
        })
    }

    /// Removes a meal and clears it from every planned day.
    pub fn delete_meal(&self, id: &MealId) -> Option<(Meal, Vec<Day>)> {
        self.mutate(|local| local.delete_meal(id))
    }

    pub fn assign_meal(&self, day: Day, id: &MealId) -> Option<Meal> {
        self.mutate(|local| local.assign_meal(day, id).cloned())
    }

    pub fn clear_day(&self, day: Day) -> Option<Meal> {
        self.mutate(|local| local.weekly_plan.clear_day(day))
    }

    pub fn clear_plan(&self) {
        self.mutate(|local| {
            local.weekly_plan.clear_all();
            Some(())
        });
    }

    pub fn randomize_plan(&self) {
        self.mutate(|local| {
            local.randomize_plan(&mut rand::rng());
            Some(())
        });
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> Option<T>) -> Option<T> {
        let (result, snapshot) = {
            let mut local = self.inner.local();
            let result = f(&mut local);
            (result, local.clone())
        };

        if result.is_some() {
            if self.inner.mark_pending_changes() {
                self.scheduler.schedule(snapshot);
            } else {
                tracing::debug!("Local edit before initial load; not scheduling a save");
            }
        }
        result
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if self.inner.state().pending_changes {
            tracing::warn!("Sync engine dropped with unsaved changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RemoteRecord, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Transactions take `delay` before touching the inner store.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn get(&self, doc_id: &str) -> Result<Option<RemoteRecord>, StoreError> {
            self.inner.get(doc_id).await
        }

        async fn run_transaction(
            &self,
            doc_id: &str,
            f: TransactionFn,
        ) -> Result<TransactionOutcome, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.run_transaction(doc_id, f).await
        }

        async fn backup(
            &self,
            backup_id: &str,
            record: PendingRecord,
        ) -> Result<ServerTimestamp, StoreError> {
            self.inner.backup(backup_id, record).await
        }

        async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError> {
            self.inner.list_backups(doc_id).await
        }
    }

    /// Reads always fail; writes go through.
    struct UnreadableStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for UnreadableStore {
        async fn get(&self, _doc_id: &str) -> Result<Option<RemoteRecord>, StoreError> {
            Err(StoreError::Unavailable("read refused".into()))
        }

        async fn run_transaction(
            &self,
            doc_id: &str,
            f: TransactionFn,
        ) -> Result<TransactionOutcome, StoreError> {
            self.0.run_transaction(doc_id, f).await
        }

        async fn backup(
            &self,
            backup_id: &str,
            record: PendingRecord,
        ) -> Result<ServerTimestamp, StoreError> {
            self.0.backup(backup_id, record).await
        }

        async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError> {
            self.0.list_backups(doc_id).await
        }
    }

    /// Lets another writer commit just before each of the next `races`
    /// transactions runs.
    #[derive(Default)]
    struct RacingStore {
        inner: MemoryStore,
        races: AtomicUsize,
        transactions: AtomicUsize,
        fail_reads: bool,
    }

    impl RacingStore {
        fn race(&self, times: usize) {
            self.races.store(times, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for RacingStore {
        async fn get(&self, doc_id: &str) -> Result<Option<RemoteRecord>, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Unavailable("read refused".into()));
            }
            self.inner.get(doc_id).await
        }

        async fn run_transaction(
            &self,
            doc_id: &str,
            f: TransactionFn,
        ) -> Result<TransactionOutcome, StoreError> {
            self.transactions.fetch_add(1, Ordering::SeqCst);
            let racing = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if racing {
                let mut other = Snapshot::default();
                other.add_meal(meal(50, "From the other tab"));
                let pending = PendingRecord::from_snapshot(&other, 0, "other").unwrap();
                self.inner.set(doc_id, pending).await?;
            }
            self.inner.run_transaction(doc_id, f).await
        }

        async fn backup(
            &self,
            backup_id: &str,
            record: PendingRecord,
        ) -> Result<ServerTimestamp, StoreError> {
            self.inner.backup(backup_id, record).await
        }

        async fn list_backups(&self, doc_id: &str) -> Result<Vec<BackupInfo>, StoreError> {
            self.inner.list_backups(doc_id).await
        }
    }

    fn meal(id: i64, name: &str) -> Meal {
        Meal::new(name, vec![format!("{} ingredient", name)]).with_id(id)
    }

    fn new_engine(store: &Arc<MemoryStore>) -> SyncEngine {
        let store: Arc<dyn DocumentStore> = store.clone();
        SyncEngine::builder(Some(store))
            .quiet_period(Duration::from_millis(200))
            .build()
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);

        let result = engine.load().await;
        assert_eq!(result, LoadResult::default());

        let status = engine.status();
        assert!(status.initial_load_complete);
        assert!(!status.pending_changes);
        assert!(status.last_known_remote.is_none());
    }

    #[tokio::test]
    async fn test_not_configured_degrades() {
        let engine = SyncEngine::builder(None).build();
        assert_eq!(engine.load().await, LoadResult::default());
        assert!(engine.status().initial_load_complete);

        let err = engine
            .save(None, None, SaveOptions::interactive())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured));
        assert!(matches!(
            engine.create_backup().await.unwrap_err(),
            SyncError::NotConfigured
        ));
        assert!(matches!(
            engine.force_reload(true).await.unwrap_err(),
            SyncError::NotConfigured
        ));
        assert!(!engine.status().saving);
    }

    #[tokio::test]
    async fn test_mark_pending_requires_initial_load() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);

        assert!(!engine.mark_pending_changes());
        assert!(!engine.status().pending_changes);

        engine.load().await;
        assert!(engine.mark_pending_changes());
        assert!(engine.status().pending_changes);
    }

    #[tokio::test]
    async fn test_save_then_load_in_new_engine() {
        let store = Arc::new(MemoryStore::new());
        let first = new_engine(&store);
        first.load().await;
        first.add_meal(meal(1, "Tacos"));
        first.assign_meal(Day::Friday, &MealId::Int(1));

        let report = first.flush().await.unwrap().unwrap();
        assert_eq!(report.version, 1);
        assert!(!report.merged);
        assert!(!first.status().pending_changes);
        assert_eq!(first.status().last_known_remote, Some(report.timestamp));

        let second = new_engine(&store);
        let loaded = second.load().await;
        assert_eq!(loaded.meals.unwrap()[0].name, "Tacos");
        assert_eq!(
            loaded.weekly_plan.unwrap().get(Day::Friday).unwrap().name,
            "Tacos"
        );
        assert_eq!(second.snapshot(), first.snapshot());
    }

    #[tokio::test]
    async fn test_save_rejected_while_saving() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;

        let _guard = engine.inner.begin_save().unwrap();
        assert!(engine.status().saving);

        let err = engine
            .save(None, None, SaveOptions::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SaveInProgress));
        assert!(store.get(DEFAULT_DOCUMENT_ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saving_flag_cleared_after_failure() {
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(ConflictChoice::Cancel)
            .build();
        engine.load().await;
        engine.save(None, None, SaveOptions::interactive()).await.unwrap();

        // Another writer moves the plan forward
        let other = new_engine(&store);
        other.load().await;
        other.save(None, None, SaveOptions::interactive()).await.unwrap();

        let err = engine
            .save(None, None, SaveOptions::interactive())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ConflictUnresolved));
        assert!(!engine.status().saving);
        assert!(engine.status().conflict_detected);
    }

    #[tokio::test]
    async fn test_silent_save_merges_on_conflict() {
        let store = Arc::new(MemoryStore::new());
        let stale = new_engine(&store);
        let fresh = new_engine(&store);
        stale.load().await;
        stale.add_meal(meal(1, "Shared"));
        stale.flush().await.unwrap();

        fresh.load().await;
        fresh.add_meal(meal(2, "Fresh only"));
        fresh.flush().await.unwrap();

        stale.add_meal(meal(3, "Stale only"));
        stale.assign_meal(Day::Monday, &MealId::Int(3));
        let report = stale
            .save(None, None, SaveOptions::silent())
            .await
            .unwrap();
        assert!(report.merged);
        assert!(!stale.status().conflict_detected);

        let ids: Vec<MealId> = stale.snapshot().meals.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MealId::Int(1), MealId::Int(3), MealId::Int(2)]);

        let record = store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.weekly_plan["Monday"]["name"], "Stale only");
    }

    #[tokio::test]
    async fn test_interactive_overwrite_discards_remote() {
        let store = Arc::new(MemoryStore::new());
        let stale = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(ConflictChoice::Overwrite)
            .build();
        let fresh = new_engine(&store);
        stale.load().await;
        stale.save(None, None, SaveOptions::interactive()).await.unwrap();

        fresh.load().await;
        fresh.add_meal(meal(2, "Remote"));
        fresh.flush().await.unwrap();

        stale.add_meal(meal(1, "Local"));
        let report = stale.flush().await.unwrap().unwrap();
        assert!(!report.merged);

        let remote = sanitize(&store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap().payload());
        assert_eq!(remote.meals.len(), 1);
        assert_eq!(remote.meals[0].name, "Local");
    }

    #[tokio::test]
    async fn test_resolver_receives_conflict_details() {
        let store = Arc::new(MemoryStore::new());
        let stale = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(|info: &ConflictInfo| {
                assert_eq!(info.remote_only_meals, 1);
                assert!(info.remote_timestamp.is_some());
                ConflictChoice::Merge
            })
            .build();
        stale.load().await;
        stale.save(None, None, SaveOptions::interactive()).await.unwrap();

        let fresh = new_engine(&store);
        fresh.load().await;
        fresh.add_meal(meal(9, "Remote"));
        fresh.flush().await.unwrap();

        let report = stale.save(None, None, SaveOptions::interactive()).await.unwrap();
        assert!(report.merged);
        assert_eq!(stale.snapshot().meals[0].name, "Remote");
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_open() {
        let store: Arc<dyn DocumentStore> = Arc::new(UnreadableStore(MemoryStore::new()));
        let engine = SyncEngine::builder(Some(store)).build();
        engine.load().await;
        assert!(engine.status().initial_load_complete);

        engine.add_meal(meal(1, "Soup"));
        let first = engine.flush().await.unwrap().unwrap();
        engine.add_meal(meal(2, "Salad"));
        let second = engine.flush().await.unwrap().unwrap();

        assert!(second.timestamp.is_newer_than(&first.timestamp));
        assert_eq!(second.version, 2);
        assert!(!engine.status().conflict_detected);
    }

    #[tokio::test]
    async fn test_write_race_retries_once() {
        let store = Arc::new(RacingStore::default());
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(ConflictChoice::Merge)
            .build();
        engine.load().await;
        engine.add_meal(meal(1, "Local"));
        engine.flush().await.unwrap();

        store.race(1);
        engine.add_meal(meal(2, "Also local"));
        let report = engine.flush().await.unwrap().unwrap();
        assert!(report.retried);
        assert!(report.merged);

        let remote = sanitize(&store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap().payload());
        let names: Vec<&str> = remote.meals.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Local", "Also local", "From the other tab"]);
        assert!(!engine.status().pending_changes);
    }

    #[tokio::test]
    async fn test_repeated_write_race_surfaces_conflict() {
        let store = Arc::new(RacingStore {
            fail_reads: true,
            ..RacingStore::default()
        });
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(ConflictChoice::Merge)
            .build();
        engine.load().await;
        engine.add_meal(meal(1, "Local"));
        engine.flush().await.unwrap();
        assert_eq!(store.transactions.load(Ordering::SeqCst), 1);

        store.race(2);
        engine.add_meal(meal(2, "Never written"));
        let err = engine.flush().await.unwrap_err();
        assert!(matches!(err, SyncError::TransactionConflict));
        assert_eq!(store.transactions.load(Ordering::SeqCst), 3);

        let status = engine.status();
        assert!(!status.saving);
        assert!(status.pending_changes);
    }

    #[tokio::test]
    async fn test_background_save_retry_flags_resolver() {
        let store = Arc::new(RacingStore::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .resolver(move |info: &ConflictInfo| {
                recorded.lock().unwrap().push(info.background);
                ConflictChoice::Cancel
            })
            .build();
        engine.load().await;
        engine.add_meal(meal(1, "Local"));
        engine.flush().await.unwrap();

        store.race(1);
        engine.add_meal(meal(2, "Background"));
        let err = engine
            .save(None, None, SaveOptions::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ConflictUnresolved));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_save_in_flight() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(300),
        });
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .quiet_period(Duration::from_millis(50))
            .build();
        engine.load().await;
        engine.add_meal(meal(1, "First"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.status().saving);

        // Edited while the debounced write is still running
        engine.add_meal(meal(2, "Second"));
        let report = engine.flush().await.unwrap().unwrap();
        assert_eq!(report.version, 2);

        let status = engine.status();
        assert!(!status.saving);
        assert!(!status.pending_changes);

        let record = store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.meals.as_array().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_in_flight_save_covers_everything() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(300),
        });
        let engine = SyncEngine::builder(Some(store.clone() as Arc<dyn DocumentStore>))
            .quiet_period(Duration::from_millis(50))
            .build();
        engine.load().await;
        engine.add_meal(meal(1, "Only"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.status().saving);

        assert!(engine.flush().await.unwrap().is_none());
        assert!(!engine.status().pending_changes);
        let record = store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap();
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_delete_meal_clears_day_before_save() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;
        engine.add_meal(meal(7, "Lasagna"));
        engine.assign_meal(Day::Wednesday, &MealId::Int(7));

        let (deleted, cleared) = engine.delete_meal(&MealId::Int(7)).unwrap();
        assert_eq!(deleted.name, "Lasagna");
        assert_eq!(cleared, vec![Day::Wednesday]);

        let snapshot = engine.snapshot();
        assert!(snapshot.meals.is_empty());
        assert!(snapshot.weekly_plan.get(Day::Wednesday).is_none());
        assert!(engine.status().save_scheduled);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_force_reload_requires_confirmation() {
        let store = Arc::new(MemoryStore::new());
        let writer = new_engine(&store);
        writer.load().await;
        writer.add_meal(meal(1, "Remote meal"));
        writer.flush().await.unwrap();

        let engine = new_engine(&store);
        engine.load().await;
        engine.add_meal(meal(2, "Unsaved"));

        let err = engine.force_reload(false).await.unwrap_err();
        assert!(matches!(err, SyncError::PendingChanges));
        assert_eq!(engine.snapshot().meals.len(), 2);

        let outcome = engine.force_reload(true).await.unwrap();
        assert!(matches!(outcome, ReloadOutcome::Reloaded { meals: 1, .. }));
        assert_eq!(engine.snapshot().meals.len(), 1);

        let status = engine.status();
        assert!(!status.pending_changes);
        assert!(!status.conflict_detected);
        assert!(!status.save_scheduled);
    }

    #[tokio::test]
    async fn test_force_reload_without_remote_data() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;
        assert_eq!(
            engine.force_reload(false).await.unwrap(),
            ReloadOutcome::NoRemoteData
        );
    }

    #[tokio::test]
    async fn test_backup_leaves_main_record_alone() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;
        engine.add_meal(meal(1, "Backed up"));
        let report = engine.flush().await.unwrap().unwrap();

        let backup = engine.create_backup().await.unwrap();
        assert!(backup.id.starts_with("weekly-plan-backup-"));
        assert_eq!(backup.version, 1);

        let record = store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap();
        assert_eq!(record.last_updated, report.timestamp);
        assert_eq!(engine.status().last_known_remote, Some(report.timestamp));
        assert_eq!(engine.list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_without_changes_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;
        assert!(engine.flush().await.unwrap().is_none());
        assert!(store.get(DEFAULT_DOCUMENT_ID).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_burst_produces_single_save() {
        let store = Arc::new(MemoryStore::new());
        let engine = new_engine(&store);
        engine.load().await;

        engine.add_meal(meal(1, "A"));
        engine.add_meal(meal(2, "B"));
        engine.assign_meal(Day::Monday, &MealId::Int(2));
        assert!(store.get(DEFAULT_DOCUMENT_ID).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;

        let record = store.get(DEFAULT_DOCUMENT_ID).await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.meals.as_array().unwrap().len(), 2);
        assert_eq!(record.weekly_plan["Monday"]["name"], "B");
        assert!(!engine.status().pending_changes);
    }
}
