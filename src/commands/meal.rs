use clap::{Args, Subcommand};

use meal_planner::models::{parse_ingredients, Meal};
use meal_planner::sync::SyncEngine;

use super::{confirm, find_meal, save_changes, OutputFormat, SaveMode};

#[derive(Args)]
pub struct MealCommand {
    #[command(subcommand)]
    pub command: MealSubcommand,
}

#[derive(Subcommand)]
pub enum MealSubcommand {
    /// Add a meal to the library
    Add {
        /// Meal name
        name: String,

        /// Comma-separated ingredients
        #[arg(long, short)]
        ingredients: String,

        /// Image URL (defaults to a stock photo)
        #[arg(long)]
        image: Option<String>,
    },

    /// List meals in the library
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one meal
    Show {
        /// Meal ID or name
        meal: String,
    },

    /// Delete a meal and clear it from the plan
    Delete {
        /// Meal ID or name
        meal: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl MealCommand {
    pub async fn run(
        &self,
        engine: &SyncEngine,
        mode: SaveMode,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MealSubcommand::Add {
                name,
                ingredients,
                image,
            } => {
                let meal = build_meal(name, ingredients, image.as_deref())?;
                let added = engine
                    .add_meal(meal)
                    .ok_or_else(|| format!("A meal with that id already exists: {}", name))?;
                println!("Added meal:");
                println!("{}", added);
                save_changes(engine, mode).await?;
                Ok(())
            }

            MealSubcommand::List { format } => {
                let snapshot = engine.snapshot();
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&snapshot.meals)?);
                    }
                    OutputFormat::Text => {
                        if snapshot.meals.is_empty() {
                            println!("No meals yet. Add one with 'meal add <name> -i <ingredients>'.");
                            return Ok(());
                        }
                        println!("{:<16} {:<30} INGREDIENTS", "ID", "NAME");
                        println!("{}", "-".repeat(70));
                        for meal in &snapshot.meals {
                            println!(
                                "{:<16} {:<30} {}",
                                meal.id.to_string(),
                                truncate(&meal.name, 30),
                                meal.ingredients.len()
                            );
                        }
                    }
                }
                Ok(())
            }

            MealSubcommand::Show { meal } => {
                let snapshot = engine.snapshot();
                let found =
                    find_meal(&snapshot, meal).ok_or_else(|| format!("Meal not found: {}", meal))?;
                print!("{}", found);
                Ok(())
            }

            MealSubcommand::Delete { meal, force } => {
                let snapshot = engine.snapshot();
                let found =
                    find_meal(&snapshot, meal).ok_or_else(|| format!("Meal not found: {}", meal))?;

                if !force && !confirm(&format!("Delete meal '{}' ({})?", found.name, found.id))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let (deleted, cleared) = engine
                    .delete_meal(&found.id)
                    .ok_or_else(|| format!("Meal not found: {}", meal))?;
                println!("Deleted meal: {}", deleted.name);
                if !cleared.is_empty() {
                    let days: Vec<&str> = cleared.iter().map(|day| day.name()).collect();
                    println!("Cleared from: {}", days.join(", "));
                }
                save_changes(engine, mode).await?;
                Ok(())
            }
        }
    }
}

/// Validates `meal add` input. Both a name and at least one ingredient are required.
fn build_meal(name: &str, ingredients: &str, image: Option<&str>) -> Result<Meal, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Meal name cannot be empty".to_string());
    }

    let ingredients = parse_ingredients(ingredients);
    if ingredients.is_empty() {
        return Err("Add at least one ingredient (comma-separated)".to_string());
    }

    let meal = Meal::new(name, ingredients);
    Ok(match image {
        Some(url) => meal.with_image(url),
        None => meal,
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
