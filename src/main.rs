use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    ConfigCommand, GroceryCommand, MealCommand, PlanCommand, SaveMode, ShellCommand,
    StdinResolver, SyncCommand,
};
use meal_planner::config::Config;
use meal_planner::store::{DocumentStore, MemoryStore, SqliteStore};
use meal_planner::sync::SyncEngine;

#[derive(Parser)]
#[command(name = "meal-planner")]
#[command(version)]
#[command(about = "Plan the week's meals and share the plan across sessions", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Keep the shared plan in memory for this process only
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage meals in the library
    Meal(MealCommand),

    /// Manage the weekly plan
    Plan(PlanCommand),

    /// Build the grocery list for the week
    Grocery(GroceryCommand),

    /// Inspect and control the shared plan
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Start an interactive session
    Shell,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meal_planner=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let store = open_store(&config, cli.memory).await;
    let session = uuid::Uuid::new_v4().simple().to_string();
    let engine = SyncEngine::builder(store)
        .document_id(config.sync.document_id.value.as_str())
        .source(format!("{}/{}", config.sync.source.value, &session[..8]))
        .quiet_period(config.sync.quiet_period())
        .resolver(StdinResolver)
        .build();
    engine.load().await;

    match command {
        Commands::Meal(cmd) => cmd.run(&engine, SaveMode::Now).await?,
        Commands::Plan(cmd) => cmd.run(&engine, SaveMode::Now).await?,
        Commands::Grocery(cmd) => cmd.run(&engine)?,
        Commands::Sync(cmd) => cmd.run(&engine).await?,
        Commands::Shell => ShellCommand.run(&engine).await?,
        Commands::Config(_) => {}
    }

    engine.shutdown();
    Ok(())
}

/// Opens the configured store. Failures leave the engine local-only.
async fn open_store(config: &Config, memory: bool) -> Option<Arc<dyn DocumentStore>> {
    if memory {
        return Some(Arc::new(MemoryStore::new()));
    }
    if !config.sync.enabled.value {
        tracing::info!("Sync disabled in configuration");
        return None;
    }

    let path = &config.sync.database_path.value;
    match SqliteStore::open(path).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!("Shared plan unavailable at {}: {}", path.display(), e);
            eprintln!("Warning: shared plan unavailable, working locally ({})", e);
            None
        }
    }
}
