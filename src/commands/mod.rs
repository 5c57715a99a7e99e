mod config_cmd;
mod grocery;
mod meal;
mod plan;
mod prompt;
mod shell;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use grocery::GroceryCommand;
pub use meal::MealCommand;
pub use plan::PlanCommand;
pub use prompt::{confirm, StdinResolver};
pub use shell::ShellCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;
use meal_planner::models::{Meal, MealId, Snapshot};
use meal_planner::sync::{SyncEngine, SyncError};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// How a command's changes reach the shared plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Save before returning (one-shot commands).
    Now,
    /// Leave it to the debounced scheduler (interactive shell).
    Deferred,
}

/// Finds a meal by id, falling back to a case-insensitive name match.
pub fn find_meal<'a>(snapshot: &'a Snapshot, reference: &str) -> Option<&'a Meal> {
    if let Ok(id) = reference.parse::<MealId>() {
        if let Some(meal) = snapshot.find_meal(&id) {
            return Some(meal);
        }
    }
    snapshot
        .meals
        .iter()
        .find(|meal| meal.name.eq_ignore_ascii_case(reference.trim()))
}

/// Pushes local changes according to `mode` and reports the result.
pub async fn save_changes(engine: &SyncEngine, mode: SaveMode) -> Result<(), SyncError> {
    if !engine.is_configured() {
        println!("Sync is disabled; changes are kept for this session only.");
        return Ok(());
    }
    if mode == SaveMode::Deferred {
        return Ok(());
    }

    match engine.flush().await? {
        Some(report) if report.merged => println!(
            "Saved version {} (merged changes from another session).",
            report.version
        ),
        Some(report) => println!("Saved version {}.", report.version),
        None => {}
    }
    Ok(())
}
