//! Debounced saving.
//!
//! Bursts of local edits collapse into one trailing save: every call to
//! [`SaveScheduler::schedule`] replaces the pending snapshot and restarts the
//! quiet-period timer. Only the latest snapshot matters because each save
//! overwrites the whole document.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::models::Snapshot;

/// Default quiet period before a scheduled save fires.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Callback that performs the save once the timer elapses.
pub type SaveFn = Arc<dyn Fn(Snapshot) -> BoxFuture<'static, ()> + Send + Sync>;

/// Owns at most one pending save timer.
pub struct SaveScheduler {
    quiet_period: Duration,
    save: SaveFn,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SaveScheduler {
    pub fn new(quiet_period: Duration, save: SaveFn) -> Self {
        Self {
            quiet_period,
            save,
            timer: Mutex::new(None),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Schedules `snapshot` to be saved after the quiet period, replacing any
    /// pending one. Must be called from within a Tokio runtime.
    pub fn schedule(&self, snapshot: Snapshot) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let save = Arc::clone(&self.save);
        let quiet_period = self.quiet_period;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            // Detached so that aborting this timer never interrupts a write.
            tokio::spawn(save(snapshot));
        }));
        tracing::debug!("Save scheduled in {:?}", quiet_period);
    }

    /// Cancels the pending timer. Returns true if one was still waiting.
    pub fn cancel(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        match timer.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                if waiting {
                    tracing::debug!("Scheduled save cancelled");
                }
                waiting
            }
            None => false,
        }
    }

    /// Returns true while a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        timer.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
