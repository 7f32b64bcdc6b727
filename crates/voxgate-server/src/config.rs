//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings (used by the `sqlite` credential backend).
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Master key and credential collection settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Upstream LLM call settings.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Provisioning API settings.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Which credential collection backs the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    File,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Master key and credential file locations.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Directory holding the key file and the JSON collection. It must
    /// already exist.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Base name of the master key file inside `data_dir`.
    #[serde(default = "default_key_file")]
    pub key_file: String,

    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Base name of the JSON collection inside `data_dir` (`file` backend).
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

/// Upstream call bounds, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

/// Provisioning API configuration. The API is not mounted without a token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub token: Option<String>,

    /// Accept plain `http` endpoints (local model servers).
    #[serde(default)]
    pub allow_insecure_endpoints: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxgate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "voxgate.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_key_file() -> String {
    "secret.key".to_string()
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_credentials_file() -> String {
    "user_config.json".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            key_file: default_key_file(),
            backend: default_backend(),
            credentials_file: default_credentials_file(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Lower bound on both forwarding timeouts. A zero timeout would fail
/// every call.
const MIN_TIMEOUT_SECS: u64 = 1;

impl ForwardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(MIN_TIMEOUT_SECS))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// Environment variable overrides:
/// - `VOXGATE_HOST` overrides `server.host`
/// - `VOXGATE_PORT` overrides `server.port`
/// - `VOXGATE_DB_PATH` overrides `database.path`
/// - `VOXGATE_STORE_BACKEND` overrides `vault.backend` (`sqlite` or `file`)
/// - `VOXGATE_DATA_DIR` overrides `vault.data_dir`
/// - `VOXGATE_KEY_FILE` overrides `vault.key_file`
/// - `VOXGATE_CREDENTIALS_FILE` overrides `vault.credentials_file`
/// - `VOXGATE_FORWARD_TIMEOUT_SECS` overrides `forward.timeout_secs`
/// - `VOXGATE_ADMIN_TOKEN` overrides `admin.token`
/// - `VOXGATE_LOG_LEVEL` overrides `logging.level`
/// - `VOXGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Unparseable numeric or enum overrides are ignored.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies `VOXGATE_*` overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("VOXGATE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXGATE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("VOXGATE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(backend) = lookup("VOXGATE_STORE_BACKEND") {
        if let Ok(parsed) = backend.parse() {
            config.vault.backend = parsed;
        }
    }
    if let Some(dir) = lookup("VOXGATE_DATA_DIR") {
        config.vault.data_dir = dir;
    }
    if let Some(key_file) = lookup("VOXGATE_KEY_FILE") {
        config.vault.key_file = key_file;
    }
    if let Some(file) = lookup("VOXGATE_CREDENTIALS_FILE") {
        config.vault.credentials_file = file;
    }
    if let Some(secs) = lookup("VOXGATE_FORWARD_TIMEOUT_SECS") {
        if let Ok(parsed) = secs.parse::<u64>() {
            if parsed >= MIN_TIMEOUT_SECS {
                config.forward.timeout_secs = parsed;
            }
        }
    }
    if let Some(token) = lookup("VOXGATE_ADMIN_TOKEN") {
        config.admin.token = Some(token).filter(|t| !t.trim().is_empty());
    }
    if let Some(level) = lookup("VOXGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
