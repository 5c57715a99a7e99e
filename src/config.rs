use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{DEFAULT_DOCUMENT_ID, DEFAULT_SOURCE};

const DEFAULT_DEBOUNCE_MS: u64 = 2000;
const DATABASE_FILE: &str = "meal-planner.db";

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    fn set(&mut self, value: T, source: ConfigSource) {
        self.value = value;
        self.source = source;
    }
}

/// Shared plan settings
#[derive(Debug, Clone, Serialize)]
pub struct SyncSettings {
    /// Use the shared document store at all
    pub enabled: ConfigValue<bool>,
    /// SQLite file holding the shared plan
    pub database_path: ConfigValue<PathBuf>,
    /// Id of the shared plan document
    pub document_id: ConfigValue<String>,
    /// Tag written with every record
    pub source: ConfigValue<String>,
    /// Quiet period before a background save, in milliseconds
    pub debounce_ms: ConfigValue<u64>,
}

impl SyncSettings {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.value)
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory for local data (holds the default database)
    pub data_dir: ConfigValue<PathBuf>,
    pub sync: SyncSettings,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal structs for deserializing the config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    sync: Option<SyncFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFile {
    enabled: Option<bool>,
    database_path: Option<PathBuf>,
    document_id: Option<String>,
    source: Option<String>,
    debounce_ms: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut enabled = ConfigValue::new(true, ConfigSource::Default);
        let mut database_path: Option<ConfigValue<PathBuf>> = None;
        let mut document_id =
            ConfigValue::new(DEFAULT_DOCUMENT_ID.to_string(), ConfigSource::Default);
        let mut source = ConfigValue::new(DEFAULT_SOURCE.to_string(), ConfigSource::Default);
        let mut debounce_ms = ConfigValue::new(DEFAULT_DEBOUNCE_MS, ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                data_dir.set(resolve_relative(&path, dir), ConfigSource::File);
            }
            if let Some(sync) = file_config.sync {
                if let Some(value) = sync.enabled {
                    enabled.set(value, ConfigSource::File);
                }
                if let Some(db_path) = sync.database_path {
                    database_path = Some(ConfigValue::new(
                        resolve_relative(&path, db_path),
                        ConfigSource::File,
                    ));
                }
                if let Some(id) = sync.document_id {
                    document_id.set(id, ConfigSource::File);
                }
                if let Some(tag) = sync.source {
                    source.set(tag, ConfigSource::File);
                }
                if let Some(ms) = sync.debounce_ms {
                    debounce_ms.set(ms, ConfigSource::File);
                }
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("MEAL_PLANNER_DATA_DIR") {
            data_dir.set(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(db_path) = std::env::var("MEAL_PLANNER_SYNC_DB") {
            database_path = Some(ConfigValue::new(
                PathBuf::from(db_path),
                ConfigSource::Environment,
            ));
        }
        if let Ok(id) = std::env::var("MEAL_PLANNER_DOCUMENT_ID") {
            document_id.set(id, ConfigSource::Environment);
        }
        if let Ok(flag) = std::env::var("MEAL_PLANNER_SYNC_DISABLED") {
            enabled.set(!is_truthy(&flag), ConfigSource::Environment);
        }

        if document_id.value.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "sync.document_id".to_string(),
                "must not be empty".to_string(),
            ));
        }

        // Without an explicit path the database follows the data directory
        let database_path = database_path.unwrap_or_else(|| {
            ConfigValue::new(data_dir.value.join(DATABASE_FILE), data_dir.source)
        });

        Ok(Self {
            data_dir,
            sync: SyncSettings {
                enabled,
                database_path,
                document_id,
                source,
                debounce_ms,
            },
            config_file,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/meal-planner/
    /// - macOS: ~/Library/Application Support/meal-planner/
    /// - Windows: %APPDATA%/meal-planner/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meal-planner")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/meal-planner/
    /// - macOS: ~/Library/Application Support/meal-planner/
    /// - Windows: %APPDATA%/meal-planner/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meal-planner")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve_relative(config_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path
            .parent()
            .map(|dir| dir.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, reason) => {
                write!(f, "Invalid value for '{}': {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
