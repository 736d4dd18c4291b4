//! Configuration handling for db_reconcile
//!
//! The `connections` and `groups` tables form the registry the command-line caller uses
//! to resolve names into live connections; the core itself only ever sees handles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::db::engine::Engine;
use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}

/// Represents the complete db_reconcile configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,
}

impl Config {
    /// Check cross references and numeric bounds
    pub fn validate(&self) -> Result<()> {
        if self.engine.batch_size == 0 {
            return Err(Error::Configuration("engine.batch_size must be at least 1".into()));
        }
        if self.engine.max_concurrent_targets == 0 {
            return Err(Error::Configuration(
                "engine.max_concurrent_targets must be at least 1".into(),
            ));
        }
        for (name, conn) in &self.connections {
            conn.engine().map_err(|e| {
                Error::Configuration(format!("connection '{}': {}", name, e))
            })?;
        }
        for (name, group) in &self.groups {
            for member in std::iter::once(&group.source).chain(group.targets.iter()) {
                if !self.connections.contains_key(member) {
                    return Err(Error::Configuration(format!(
                        "group '{}' references unknown connection '{}'",
                        name, member
                    )));
                }
            }
            if group.targets.is_empty() {
                return Err(Error::Configuration(format!("group '{}' has no targets", name)));
            }
        }
        Ok(())
    }

    /// Look up a connection by name
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown connection '{}'", name)))
    }

    /// Look up an instance group by name
    pub fn group(&self, name: &str) -> Result<&GroupConfig> {
        self.groups
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown group '{}'", name)))
    }
}

/// Engine-wide tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_seconds: u64,
}

impl EngineConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_targets: default_max_concurrent_targets(),
            statement_timeout_seconds: default_statement_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

fn default_max_concurrent_targets() -> usize {
    4
}

fn default_statement_timeout() -> u64 {
    30
}

/// Migration apply behaviour
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MigrationsConfig {
    #[serde(default)]
    pub transactional: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// Snapshot cache behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionConfig {
    pub driver: String,
    pub url: String,
    pub schema: Option<String>,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

impl ConnectionConfig {
    /// Resolve the configured driver name into an engine
    pub fn engine(&self) -> Result<Engine> {
        self.driver.parse()
    }
}

/// One source plus N targets compared as a batch
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupConfig {
    pub source: String,
    pub targets: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}
