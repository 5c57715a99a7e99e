use chrono::Local;
use clap::Args;
use std::path::PathBuf;

use meal_planner::models::GroceryList;
use meal_planner::sync::SyncEngine;

/// Build the grocery list for the planned week
#[derive(Args)]
pub struct GroceryCommand {
    /// Write the list to this file instead of printing it
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write the list to "Week-of-MM-DD-Groceries.txt" in the current directory
    #[arg(long, conflicts_with = "output")]
    save: bool,
}

impl GroceryCommand {
    pub fn run(&self, engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
        let snapshot = engine.snapshot();
        let Some(list) = GroceryList::from_plan(&snapshot.weekly_plan, Local::now().date_naive())
        else {
            println!("No meals planned for this week.");
            return Ok(());
        };

        let target = match (&self.output, self.save) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => Some(PathBuf::from(list.filename())),
            (None, false) => None,
        };

        match target {
            Some(path) => {
                std::fs::write(&path, list.to_string())?;
                println!("Wrote grocery list to {}", path.display());
            }
            None => print!("{}", list),
        }
        Ok(())
    }
}
