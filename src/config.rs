// src/config.rs
use std::env;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use governor::Quota;
use log::info;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::mapname::Mapname;

pub const CONFIG_TABLE: &str = "srcquery";
pub const DEFAULT_CONFIG_PATH: &str = "srcquery.toml";
pub const DEFAULT_MAPNAMES_PATH: &str = "mapnames.toml";

/// Process level settings, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub config_path: PathBuf,

    // Rate limiting for the query endpoint
    pub query_period_secs: u64,
    pub query_burst_limit: u32,

    /// Shared secret required by `/refresh` when set.
    pub refresh_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            query_period_secs: 1,
            query_burst_limit: 10,
            refresh_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),

            config_path: env::var("SRCQUERY_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),

            query_period_secs: env::var("QUERY_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.query_period_secs),

            query_burst_limit: env::var("QUERY_BURST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.query_burst_limit),

            refresh_token: env::var("REFRESH_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    pub fn query_quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.query_burst_limit).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(Duration::from_secs(self.query_period_secs.max(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub group: String,
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServerGroupConfig {
    pub name: String,
    #[serde(default)]
    pub related_sessions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FmtConfig {
    /// strftime pattern for query timestamps.
    #[serde(default = "default_time_fmt")]
    pub time: String,
}

impl Default for FmtConfig {
    fn default() -> Self {
        Self {
            time: default_time_fmt(),
        }
    }
}

/// The `[srcquery]` table of the service configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct QueryConfig {
    /// Seconds to wait on a single server query.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Cache TTL in seconds.
    #[serde(default = "default_cache_delay")]
    pub cache_delay: u64,
    #[serde(default)]
    pub default_group: Option<String>,
    #[serde(default = "default_overview_keyword")]
    pub overview_keyword: String,
    #[serde(default = "default_mapnames_db")]
    pub mapnames_db: PathBuf,
    #[serde(default)]
    pub fmt: FmtConfig,
    #[serde(default)]
    pub server_groups: Vec<ServerGroupConfig>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

fn default_timeout() -> u64 {
    5
}

fn default_cache_delay() -> u64 {
    20
}

fn default_overview_keyword() -> String {
    "人数".to_string()
}

fn default_mapnames_db() -> PathBuf {
    PathBuf::from(DEFAULT_MAPNAMES_PATH)
}

fn default_time_fmt() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

#[derive(Deserialize)]
struct ConfigFile {
    srcquery: QueryConfig,
}

#[derive(Deserialize)]
struct MapnamesFile {
    #[serde(default)]
    mapnames: Vec<Mapname>,
}

impl QueryConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let config = file.srcquery;
        if config.timeout == 0 {
            return Err(ConfigError::Invalid(format!(
                "{CONFIG_TABLE}.timeout must be at least one second"
            )));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let text = read(path)?;
        Self::parse(&text, path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

pub fn parse_mapnames(text: &str, path: &Path) -> Result<Vec<Mapname>, ConfigError> {
    let file: MapnamesFile = toml::from_str(text).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.mapnames)
}

pub fn load_mapnames(path: &Path) -> Result<Vec<Mapname>, ConfigError> {
    info!("Loading map database from {}", path.display());
    let text = read(path)?;
    parse_mapnames(&text, path)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
