//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (WORDWIRE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Base URL of the article-metadata collaborator.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Redis URL for the shared store and bus. Unset means in-process
    /// store and bus, which is only correct for a single instance.
    #[serde(default = "default_redis_url")]
    pub redis_url: Option<String>,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Cooldown configuration.
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Moderation configuration.
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Ping interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Idle cutoff in milliseconds; connections silent this long are
    /// terminated.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Cooldown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Cooldown window per accepted edit, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub duration_ms: u64,
}

/// Moderation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Denylisted terms. Empty disables the filter.
    #[serde(default)]
    pub denylist: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("WORDWIRE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("WORDWIRE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_ws_path() -> String {
    "/".to_string()
}

fn default_site_url() -> String {
    std::env::var("WORDWIRE_SITE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
}

fn default_redis_url() -> Option<String> {
    std::env::var("WORDWIRE_REDIS_URL").ok()
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

fn default_heartbeat_timeout() -> u64 {
    60_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            websocket_path: default_ws_path(),
            site_url: default_site_url(),
            redis_url: default_redis_url(),
            heartbeat: HeartbeatConfig::default(),
            cooldown: CooldownConfig::default(),
            moderation: ModerationConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_cooldown_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "wordwire.toml",
            "/etc/wordwire/wordwire.toml",
            "~/.config/wordwire/wordwire.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}
