use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::errors::WikiError;

/// Application configuration and constants
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root directory holding `meta.json` and the page content files.
    pub docs_dir: PathBuf,
    /// Flat block list, one `<ip> 1; # <timestamp>` entry per line.
    pub blocked_ips_file: PathBuf,
    /// Endpoint notified with `{ "ip": ... }` whenever an address is blocked.
    pub block_notify_url: Option<String>,
    /// Bearer token required on mutating endpoints. Open when unset.
    pub admin_token: Option<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub max_failed_logins: u32,
    pub block_duration_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5004,
            docs_dir: PathBuf::from("data/docs"),
            blocked_ips_file: PathBuf::from("config/blocked_ips.conf"),
            block_notify_url: None,
            admin_token: None,
            rate_limit_max: 300,
            rate_limit_window_secs: 60,
            max_failed_logins: 15,
            block_duration_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
        }
    }

    /// Create configuration rooted at a docs directory, everything else default
    pub fn with_docs_dir(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            ..Self::new()
        }
    }

    /// Load from the TOML file named by `FOLIO_CONFIG` (if any), then apply
    /// `FOLIO_*` environment overrides.
    pub fn load() -> Result<Self, WikiError> {
        let mut config = match std::env::var("FOLIO_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::new(),
        };
        config.apply_env();
        info!(
            "Configuration loaded: docs_dir={:?}, listen={}:{}",
            config.docs_dir, config.host, config.port
        );
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, WikiError> {
        debug!("Reading configuration from {:?}", path);
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WikiError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| WikiError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("FOLIO_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("FOLIO_PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Ok(dir) = std::env::var("FOLIO_DOCS_DIR") {
            self.docs_dir = PathBuf::from(dir);
        }
        if let Ok(token) = std::env::var("FOLIO_ADMIN_TOKEN") {
            self.admin_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(url) = std::env::var("FOLIO_BLOCK_NOTIFY_URL") {
            self.block_notify_url = Some(url).filter(|u| !u.is_empty());
        }
    }

    /// Get the socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, WikiError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| WikiError::Config(format!("invalid listen address: {}", e)))
    }

    pub fn meta_path(&self) -> PathBuf {
        self.docs_dir.join("meta.json")
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
