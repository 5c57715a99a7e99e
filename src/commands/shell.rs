//! Interactive session.
//!
//! Keeps one engine alive so edits are saved by the debounced scheduler
//! rather than one write per command. Pending changes are flushed on exit.

use clap::{Parser, Subcommand};
use std::io::{self, Write};

use meal_planner::sync::SyncEngine;

use super::{GroceryCommand, MealCommand, PlanCommand, SaveMode, SyncCommand};

/// Interactive session over stdin.
pub struct ShellCommand;

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellAction,
}

#[derive(Subcommand)]
enum ShellAction {
    /// Manage meals
    Meal(MealCommand),
    /// Manage the weekly plan
    Plan(PlanCommand),
    /// Show the grocery list
    Grocery(GroceryCommand),
    /// Inspect and control the shared plan
    Sync(SyncCommand),
    /// Save pending changes and leave
    #[command(alias = "quit")]
    Exit,
}

impl ShellCommand {
    pub async fn run(&self, engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
        println!("Meal planner shell. Type 'help' for commands, 'exit' to quit.");

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                println!();
                break;
            }

            let words = match split_words(&line) {
                Ok(words) if words.is_empty() => continue,
                Ok(words) => words,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    continue;
                }
            };

            let parsed = match ShellLine::try_parse_from(words) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Help and usage errors both print through clap
                    let _ = e.print();
                    continue;
                }
            };

            let result = match parsed.command {
                ShellAction::Meal(cmd) => cmd.run(engine, SaveMode::Deferred).await,
                ShellAction::Plan(cmd) => cmd.run(engine, SaveMode::Deferred).await,
                ShellAction::Grocery(cmd) => cmd.run(engine),
                ShellAction::Sync(cmd) => cmd.run(engine).await,
                ShellAction::Exit => break,
            };
            if let Err(e) = result {
                eprintln!("Error: {}", e);
            }
        }

        if engine.is_configured() {
            if let Some(report) = engine.flush().await? {
                println!("Saved version {}.", report.version);
            }
        }
        engine.shutdown();
        Ok(())
    }
}

/// Splits a command line on whitespace, keeping double-quoted text together.
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("Unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
