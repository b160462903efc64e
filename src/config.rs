//! Gateway configuration
//!
//! Three layers, later ones winning: built-in defaults, an optional TOML
//! file (`~/.config/tvfleet/config.toml` or `--config`), and CLI/env flags.
//! All file fields are optional; the file is a partial overlay.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::link::BridgeConfig;
use crate::Result;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Default cap on targets per batch request
pub const DEFAULT_MAX_BATCH: usize = 20;

/// Resolved gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub host: String,
    /// Port to bind the HTTP server to
    pub port: u16,
    /// Fleet configuration file (JSON, `{"tvs": [...]}`)
    pub fleet_path: PathBuf,
    /// Pairing-token file
    pub tokens_path: PathBuf,
    /// External protocol bridge
    pub bridge: BridgeConfig,
    /// Concurrent-mode worker cap
    pub max_workers: usize,
    /// Maximum targets per batch request
    pub max_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            fleet_path: PathBuf::from("config/fleet.json"),
            tokens_path: PathBuf::from("tokens.json"),
            bridge: BridgeConfig::default(),
            max_workers: crate::dispatch::DEFAULT_MAX_WORKERS,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub paths: PathsFileConfig,
    #[serde(default)]
    pub bridge: BridgeFileConfig,
    #[serde(default)]
    pub dispatch: DispatchFileConfig,
}

/// HTTP server settings
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fleet and token file locations
#[derive(Debug, Default, Deserialize)]
pub struct PathsFileConfig {
    pub fleet: Option<PathBuf>,
    pub tokens: Option<PathBuf>,
}

/// External bridge command settings
#[derive(Debug, Default, Deserialize)]
pub struct BridgeFileConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

/// Dispatcher settings
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    pub max_workers: Option<usize>,
    pub max_batch: Option<usize>,
}

impl Config {
    /// Load configuration, overlaying the given file (or the default
    /// location) on top of defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing or any file
    /// fails to parse.
    pub fn load(explicit_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        let path = match explicit_path {
            Some(p) => Some(p.clone()),
            None => default_config_path().filter(|p| p.exists()),
        };
        if let Some(path) = path {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                crate::Error::Config(format!("cannot read config {}: {e}", path.display()))
            })?;
            let file: ConfigFile = toml::from_str(&raw)?;
            config.apply(file);
            tracing::debug!(path = %path.display(), "applied config file");
        }

        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(host) = file.server.host {
            self.host = host;
        }
        if let Some(port) = file.server.port {
            self.port = port;
        }
        if let Some(fleet) = file.paths.fleet {
            self.fleet_path = fleet;
        }
        if let Some(tokens) = file.paths.tokens {
            self.tokens_path = tokens;
        }
        if let Some(program) = file.bridge.program {
            self.bridge.program = program;
        }
        if let Some(args) = file.bridge.args {
            self.bridge.args = args;
        }
        if let Some(secs) = file.bridge.timeout_secs {
            self.bridge.timeout = Duration::from_secs(secs);
        }
        if let Some(max_workers) = file.dispatch.max_workers {
            self.max_workers = max_workers.max(1);
        }
        if let Some(max_batch) = file.dispatch.max_batch {
            self.max_batch = max_batch.max(1);
        }
    }
}

/// `~/.config/tvfleet/config.toml` (platform equivalent)
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tvfleet")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
