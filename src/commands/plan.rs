use chrono::Local;
use clap::{Args, Subcommand};

use meal_planner::models::{week_range_label, Day};
use meal_planner::sync::SyncEngine;

use super::{confirm, find_meal, save_changes, OutputFormat, SaveMode};

#[derive(Args)]
pub struct PlanCommand {
    #[command(subcommand)]
    pub command: PlanSubcommand,
}

#[derive(Subcommand)]
pub enum PlanSubcommand {
    /// Show the weekly plan
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Assign a meal to a day
    Assign {
        /// Day of the week (e.g. monday, tue)
        day: Day,

        /// Meal ID or name
        meal: String,
    },

    /// Clear one day, or the whole week
    Clear {
        /// Day to clear (omit to clear the whole week)
        day: Option<Day>,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Fill every day with a random meal from the library
    Randomize,
}

impl PlanCommand {
    pub async fn run(
        &self,
        engine: &SyncEngine,
        mode: SaveMode,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            PlanSubcommand::Show { format } => {
                let snapshot = engine.snapshot();
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&snapshot.weekly_plan)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", week_range_label(Local::now().date_naive()));
                        println!();
                        print!("{}", snapshot.weekly_plan);
                    }
                }
                Ok(())
            }

            PlanSubcommand::Assign { day, meal } => {
                let snapshot = engine.snapshot();
                let found =
                    find_meal(&snapshot, meal).ok_or_else(|| format!("Meal not found: {}", meal))?;

                let assigned = engine
                    .assign_meal(*day, &found.id)
                    .ok_or_else(|| format!("Meal not found: {}", meal))?;
                println!("{}: {}", day, assigned.name);
                save_changes(engine, mode).await?;
                Ok(())
            }

            PlanSubcommand::Clear { day: Some(day), .. } => {
                match engine.clear_day(*day) {
                    Some(meal) => {
                        println!("Cleared {} ({}).", day, meal.name);
                        save_changes(engine, mode).await?;
                    }
                    None => println!("Nothing planned for {}.", day),
                }
                Ok(())
            }

            PlanSubcommand::Clear { day: None, force } => {
                if engine.snapshot().weekly_plan.is_empty() {
                    println!("The plan is already empty.");
                    return Ok(());
                }
                if !force && !confirm("Clear the whole week?")? {
                    println!("Clear cancelled.");
                    return Ok(());
                }
                engine.clear_plan();
                println!("Cleared the weekly plan.");
                save_changes(engine, mode).await?;
                Ok(())
            }

            PlanSubcommand::Randomize => {
                if engine.snapshot().meals.is_empty() {
                    return Err("Add some meals before randomizing the plan".into());
                }
                engine.randomize_plan();
                print!("{}", engine.snapshot().weekly_plan);
                save_changes(engine, mode).await?;
                Ok(())
            }
        }
    }
}
