//! Configuration loading and config-file resolution
//!
//! Configuration is an explicit [`EtlConfig`] value handed to the pipeline
//! driver at construction. There is no process-wide configuration state.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`SPARKIFY_CONFIG`)
//! 3. `<user config dir>/sparkify/etl.toml` if it exists
//! 4. Built-in defaults (no file)
//!
//! Individual fields may then be overridden by CLI flags.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SPARKIFY_CONFIG";

/// Target backend, one per deployment variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local relational database, per-row existence check per unit transaction
    #[default]
    Transactional,
    /// Warehouse staging tables merged with a set-based anti-join
    Warehouse,
    /// Columnar files, partition overwrite after a build barrier
    Lake,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Transactional => "transactional",
            Backend::Warehouse => "warehouse",
            Backend::Lake => "lake",
        }
    }

    /// Whether this backend writes to the SQLite database (vs. files)
    pub fn uses_database(&self) -> bool {
        !matches!(self, Backend::Lake)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "transactional" => Ok(Backend::Transactional),
            "warehouse" => Ok(Backend::Warehouse),
            "lake" => Ok(Backend::Lake),
            other => Err(Error::Config(format!("Unknown backend: {}", other))),
        }
    }
}

/// Top-level ETL configuration (TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Target backend
    #[serde(default)]
    pub backend: Backend,

    /// Root directory of song-metadata JSON files
    #[serde(default = "default_song_data")]
    pub song_data: PathBuf,

    /// Root directory of event-log JSON files
    #[serde(default = "default_log_data")]
    pub log_data: PathBuf,

    /// SQLite database file (transactional and warehouse backends)
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Output directory for columnar tables (lake backend)
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Load behavior (retries, timeouts, unit sizing)
    #[serde(default)]
    pub load: LoadConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Retries of a unit after a retriable store error
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubled after each retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Timeout applied to each load call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Abort the run on the first failed unit
    #[serde(default)]
    pub fail_fast: bool,

    /// Source files grouped into one unit (one commit)
    #[serde(default = "default_files_per_unit")]
    pub files_per_unit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_song_data() -> PathBuf {
    PathBuf::from("data/song_data")
}

fn default_log_data() -> PathBuf {
    PathBuf::from("data/log_data")
}

fn default_database() -> PathBuf {
    PathBuf::from("sparkify.db")
}

fn default_output() -> PathBuf {
    PathBuf::from("analytics")
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_files_per_unit() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_timeout_ms(),
            fail_fast: false,
            files_per_unit: default_files_per_unit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            song_data: default_song_data(),
            log_data: default_log_data(),
            database: default_database(),
            output: default_output(),
            load: LoadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LoadConfig {
    pub fn timeout(&self) -> Duration {
        crate::time::millis_to_duration(self.timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based), doubling and capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        crate::time::millis_to_duration(delay)
    }
}

impl EtlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file and load it, or fall back to defaults
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR)? {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check that sources and target are usable before discovery starts
    pub fn validate(&self) -> Result<()> {
        for (label, dir) in [("song_data", &self.song_data), ("log_data", &self.log_data)] {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(format!("{} is not set", label)));
            }
            if !dir.is_dir() {
                return Err(Error::Config(format!(
                    "{} directory not found: {}",
                    label,
                    dir.display()
                )));
            }
        }

        let target = if self.backend.uses_database() {
            ("database", &self.database)
        } else {
            ("output", &self.output)
        };
        if target.1.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "{} target is not set for backend {}",
                target.0, self.backend
            )));
        }

        if self.load.files_per_unit == 0 {
            return Err(Error::Config("load.files_per_unit must be at least 1".to_string()));
        }
        if self.load.timeout_ms == 0 {
            return Err(Error::Config("load.timeout_ms must be positive".to_string()));
        }

        Ok(())
    }
}

/// Config file resolution:
/// 1. Command-line argument (highest priority; must exist)
/// 2. Environment variable (must exist)
/// 3. User config directory, if the file is present
/// 4. None (use built-in defaults)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return existing(path.to_path_buf()).map(Some);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return existing(PathBuf::from(path)).map(Some);
        }
    }

    // Priority 3: Platform config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("sparkify").join("etl.toml")) {
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    // Priority 4: Built-in defaults
    Ok(None)
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = EtlConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend, Backend::Transactional);
        assert_eq!(config.song_data, PathBuf::from("data/song_data"));
        assert_eq!(config.load.max_retries, 3);
        assert_eq!(config.load.files_per_unit, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_backend_parsing() {
        let config = EtlConfig::from_toml_str("backend = \"lake\"").unwrap();
        assert_eq!(config.backend, Backend::Lake);
        assert_eq!("Warehouse".parse::<Backend>().unwrap(), Backend::Warehouse);
        assert!("hdfs".parse::<Backend>().is_err());
    }

    #[test]
    fn test_unknown_backend_in_toml_rejected() {
        let result = EtlConfig::from_toml_str("backend = \"redshift\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let load = LoadConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            ..LoadConfig::default()
        };
        assert_eq!(load.backoff_for(1), Duration::from_millis(10));
        assert_eq!(load.backoff_for(2), Duration::from_millis(20));
        assert_eq!(load.backoff_for(3), Duration::from_millis(40));
        assert_eq!(load.backoff_for(4), Duration::from_millis(50));
        assert_eq!(load.backoff_for(60), Duration::from_millis(50));
    }

    #[test]
    fn test_validate_missing_source_dir() {
        let config = EtlConfig {
            song_data: PathBuf::from("/definitely/not/here/song_data"),
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_zero_files_per_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EtlConfig {
            song_data: dir.path().to_path_buf(),
            log_data: dir.path().to_path_buf(),
            ..EtlConfig::default()
        };
        assert!(config.validate().is_ok());

        config.load.files_per_unit = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_lake_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = EtlConfig {
            backend: Backend::Lake,
            song_data: dir.path().to_path_buf(),
            log_data: dir.path().to_path_buf(),
            output: PathBuf::new(),
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
