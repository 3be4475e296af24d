use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use dotfwd_client::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, level_filters::LevelFilter};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        LevelFilter::from_level(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to listen on for DNS queries.
    pub ip: String,
    /// UDP port to listen on for DNS queries.
    pub port: u16,
    pub log_level: LogLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".into(),
            port: 53,
            log_level: LogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Address of the DNS-over-TLS resolver.
    pub address: SocketAddr,
    /// Name the resolver's certificate is checked against.
    pub server_name: String,
    /// Extra PEM certificates to trust besides the webpki roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([1, 1, 1, 1], 853)),
            server_name: "cloudflare-dns.com".into(),
            ca_file: None,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// How long a listener waits for an upstream answer.
    pub query_timeout_ms: u64,
    /// How long shutdown waits for outstanding answers, 0 waits forever.
    pub drain_timeout_ms: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 5_000,
            drain_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept after a clean.
    pub min_entries: usize,
    /// Inserts after which a clean runs.
    pub max_entries: usize,
    /// Period of the expired-entry reaper, 0 disables it.
    pub clean_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_entries: dotfwd_cache::DEFAULT_MIN_ENTRIES,
            max_entries: dotfwd_cache::DEFAULT_MAX_ENTRIES,
            clean_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub client: ForwardingConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.upstream.connect_timeout_ms),
            drain_timeout: match self.client.drain_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            ..ClientConfig::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.client.query_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found")]
    NotFound,
    #[error("{0}")]
    Decode(String),
}

fn decode_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::NotFound)?;
    toml::from_str(&content).map_err(|e| ConfigError::Decode(e.message().into()))
}

/// Load the config, writing a default one to `config_path` if none exists.
pub fn load_config(config_path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = config_path.as_ref();
    match decode_from_path(path) {
        Ok(cfg) => Ok(cfg),
        Err(ConfigError::NotFound) => create_default_config(path),
        Err(e) => Err(e.into()),
    }
}

pub fn create_default_config(path: &Path) -> anyhow::Result<Config> {
    let cfg = Config::default();
    let toml_str = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(cfg)
}
