use clap::{Args, Subcommand};

use meal_planner::config::{Config, ConfigValue};

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        print_value("data_dir", &config.data_dir, |v| v.display().to_string());
                        print_value("sync.enabled", &config.sync.enabled, bool::to_string);
                        print_value("sync.database_path", &config.sync.database_path, |v| {
                            v.display().to_string()
                        });
                        print_value("sync.document_id", &config.sync.document_id, String::clone);
                        print_value("sync.source", &config.sync.source, String::clone);
                        print_value("sync.debounce_ms", &config.sync.debounce_ms, u64::to_string);
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_value<T>(key: &str, value: &ConfigValue<T>, render: impl Fn(&T) -> String) {
    println!("{}: {}", key, render(&value.value));
    println!("  source: {}", value.source);
    println!();
}
