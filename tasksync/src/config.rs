//! Configuration system for the `TaskSync` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasksync/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::conn;
use crate::engine::EngineConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The gateway URL is not a valid WebSocket URL.
    #[error("invalid gateway url {url}: {reason}")]
    InvalidGatewayUrl {
        /// The offending value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Could not determine the user's data directory.
    #[error("could not determine data directory (no HOME or XDG_DATA_HOME)")]
    NoDataDir,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    gateway: GatewayFileConfig,
    storage: StorageFileConfig,
}

/// `[gateway]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Default gateway endpoint, matching the gateway's default bind.
const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:9100/ws";

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sync gateway WebSocket URL.
    pub gateway_url: String,
    /// Timeout for the connect handshake.
    pub connect_timeout: Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
    /// Directory for the durable task mirror and identity slot.
    /// `None` means resolve the platform data dir at startup.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            connect_timeout: conn::CONNECT_TIMEOUT,
            reconnect_delay: conn::RECONNECT_DELAY,
            channel_capacity: 256,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/tasksync/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved gateway URL is not a `ws`/`wss` URL.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        validate_gateway_url(&config.gateway_url)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            gateway_url: cli
                .gateway_url
                .clone()
                .or_else(|| file.gateway.url.clone())
                .unwrap_or(defaults.gateway_url),
            connect_timeout: file
                .gateway
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            reconnect_delay: file
                .gateway
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            channel_capacity: file
                .gateway
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone().map(PathBuf::from)),
        }
    }

    /// Build an [`EngineConfig`] from this configuration.
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            gateway_url: self.gateway_url.clone(),
            connect_timeout: self.connect_timeout,
            reconnect_delay: self.reconnect_delay,
            channel_capacity: self.channel_capacity,
        }
    }

    /// Resolve the directory holding the durable mirror.
    ///
    /// Uses the configured directory if set, otherwise the platform data
    /// dir (`~/.local/share/tasksync` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDataDir`] when no directory is configured
    /// and the platform data dir cannot be determined.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("tasksync"))
            .ok_or(ConfigError::NoDataDir)
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Offline-first task list synchronized over WebSocket")]
pub struct CliArgs {
    /// WebSocket URL of the sync gateway.
    #[arg(long, env = "TASKSYNC_GATEWAY")]
    pub gateway_url: Option<String>,

    /// Log in as this name immediately on startup.
    #[arg(long, env = "TASKSYNC_NAME")]
    pub name: Option<String>,

    /// Directory for the durable task mirror.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to config file (default: `~/.config/tasksync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tasksync.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Rejects anything that is not a parseable `ws://` or `wss://` URL.
fn validate_gateway_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidGatewayUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidGatewayUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(())
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("tasksync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
