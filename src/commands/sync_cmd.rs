//! Shared plan commands: status, explicit save, reload and backups.

use clap::{Args, Subcommand};
use serde::Serialize;

use meal_planner::sync::{ReloadOutcome, SaveOptions, SyncEngine, SyncError};

use super::{confirm, OutputFormat};

/// Inspect and control the shared plan
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: SyncSubcommand,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync status
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Save local data to the shared plan now
    Save {
        /// Overwrite the shared plan without checking for conflicts
        #[arg(long)]
        force: bool,
    },

    /// Replace local data with the shared plan
    Reload {
        /// Discard unsaved local changes without asking
        #[arg(long, short)]
        yes: bool,
    },

    /// Back up local data to a new timestamped document
    Backup,

    /// List backups of the shared plan
    Backups {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Serialize)]
struct StatusView {
    configured: bool,
    document_id: String,
    saving: bool,
    last_saved: Option<String>,
    remote_version: Option<u64>,
    conflict_detected: bool,
    pending_changes: bool,
    save_scheduled: bool,
    meals: usize,
}

impl SyncCommand {
    pub async fn run(&self, engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SyncSubcommand::Status { format } => {
                let status = engine.status();
                let view = StatusView {
                    configured: status.configured,
                    document_id: engine.document_id().to_string(),
                    saving: status.saving,
                    last_saved: status.last_saved.map(|ts| ts.to_rfc3339()),
                    remote_version: status.remote_version,
                    conflict_detected: status.conflict_detected,
                    pending_changes: status.pending_changes,
                    save_scheduled: status.save_scheduled,
                    meals: engine.snapshot().meals.len(),
                };

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
                    OutputFormat::Text => print_status(&view),
                }
                Ok(())
            }

            SyncSubcommand::Save { force } => {
                let options = SaveOptions::interactive().with_force_overwrite(*force);
                let report = engine.save(None, None, options).await?;
                println!("Saved version {} at {}.", report.version, report.timestamp);
                if report.merged {
                    println!("Merged meals added by another session.");
                }
                if report.retried {
                    println!("The plan changed while saving; the save was retried.");
                }
                Ok(())
            }

            SyncSubcommand::Reload { yes } => {
                let outcome = match engine.force_reload(*yes).await {
                    Err(SyncError::PendingChanges) => {
                        if !confirm("You have unsaved changes. Discard them and reload?")? {
                            println!("Reload cancelled.");
                            return Ok(());
                        }
                        engine.force_reload(true).await?
                    }
                    result => result?,
                };

                match outcome {
                    ReloadOutcome::Reloaded { meals, timestamp } => {
                        println!("Reloaded {} meals (updated {}).", meals, timestamp)
                    }
                    ReloadOutcome::NoRemoteData => println!("No saved data found."),
                }
                Ok(())
            }

            SyncSubcommand::Backup => {
                let backup = engine.create_backup().await?;
                println!("Created backup: {}", backup.id);
                Ok(())
            }

            SyncSubcommand::Backups { format } => {
                let backups = engine.list_backups().await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&backups)?),
                    OutputFormat::Text => {
                        if backups.is_empty() {
                            println!("No backups found.");
                            return Ok(());
                        }
                        println!("{:<60} {:<8} UPDATED", "ID", "VERSION");
                        println!("{}", "-".repeat(100));
                        for backup in &backups {
                            println!(
                                "{:<60} {:<8} {}",
                                backup.id, backup.version, backup.last_updated
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_status(view: &StatusView) {
    println!("Sync Status");
    println!("===========");
    println!();

    if !view.configured {
        println!("Status: Not configured");
        println!();
        println!("To enable sync, set in your config file:");
        println!();
        println!("  sync:");
        println!("    enabled: true");
        println!("    database_path: /path/to/shared/meal-planner.db");
        println!();
        println!("Or set environment variable:");
        println!("  MEAL_PLANNER_SYNC_DB");
        return;
    }

    println!("Document:    {}", view.document_id);
    println!("Meals:       {}", view.meals);
    println!(
        "Last saved:  {}",
        view.last_saved.as_deref().unwrap_or("never")
    );
    match view.remote_version {
        Some(version) => println!("Version:     {}", version),
        None => println!("Version:     -"),
    }

    let state = if view.saving {
        "saving"
    } else if view.conflict_detected {
        "conflict detected"
    } else if view.pending_changes {
        "unsaved changes"
    } else {
        "up to date"
    };
    println!("State:       {}", state);
    if view.save_scheduled {
        println!("A save is scheduled.");
    }
}
