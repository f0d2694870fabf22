//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default SQLite file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "acolyte.db";

/// Default prefix for named lock keys.
pub const DEFAULT_LOCK_NAMESPACE: &str = "acolyte";

/// Default tracing filter level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Root configuration.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcolyteConfig {
    /// `[database]` section.
    pub database: Option<DatabaseConfig>,
    /// `[engine]` section.
    pub engine: Option<EngineConfig>,
    /// `[logging]` section.
    pub logging: Option<LoggingConfig>,
}

impl AcolyteConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with every section filled with its defaults.
    pub fn with_defaults() -> Self {
        Self {
            database: Some(DatabaseConfig::default()),
            engine: Some(EngineConfig::default()),
            logging: Some(LoggingConfig::default()),
        }
    }

    /// Every section resolved to its effective value.
    pub fn effective(&self) -> Self {
        Self {
            database: Some(self.database()),
            engine: Some(self.engine()),
            logging: Some(self.logging()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: AcolyteConfig) {
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.engine.is_some() {
            self.engine = other.engine;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Effective database section.
    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }

    /// Effective engine section.
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    /// Effective logging section.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

/// Database configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. `":memory:"` opens a throwaway in-memory database.
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

/// Engine configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for named lock keys.
    pub lock_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_namespace: DEFAULT_LOCK_NAMESPACE.to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}
