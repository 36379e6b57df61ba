//! Configuration system for the `TaskSync` gateway.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasksync-gateway/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading gateway configuration.
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

    /// The resolved bind address is not usable.
    #[error("invalid bind address '{addr}': {reason}")]
    InvalidBindAddr {
        /// The offending address string.
        addr: String,
        /// What was wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the gateway.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the gateway server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "TaskSync gateway server")]
pub struct GatewayCliArgs {
    /// Address to bind the gateway server to.
    #[arg(short, long, env = "TASKSYNC_GATEWAY_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/tasksync-gateway/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKSYNC_GATEWAY_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved gateway server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved bind address is malformed.
    pub fn load(cli: &GatewayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        validate_bind_addr(&config.bind_addr)?;
        Ok(config)
    }

    /// Resolve a `GatewayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &GatewayCliArgs, file: &GatewayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Checks that a bind address is `host:port` with a numeric port.
///
/// The host may be a name; resolution is left to the listener at startup.
/// Catching a missing or garbage port here gives a readable startup error
/// instead of a bind failure deep in the server.
fn validate_bind_addr(addr: &str) -> Result<(), ConfigError> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(ConfigError::InvalidBindAddr {
            addr: addr.to_string(),
            reason: "expected host:port".to_string(),
        });
    };
    if host.is_empty() {
        return Err(ConfigError::InvalidBindAddr {
            addr: addr.to_string(),
            reason: "empty host".to_string(),
        });
    }
    if port.parse::<u16>().is_err() {
        return Err(ConfigError::InvalidBindAddr {
            addr: addr.to_string(),
            reason: format!("'{port}' is not a valid port"),
        });
    }
    Ok(())
}

/// Load and parse a TOML config file for the gateway.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<GatewayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(GatewayConfigFile::default());
        };
        config_dir.join("tasksync-gateway").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
