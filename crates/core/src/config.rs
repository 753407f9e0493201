use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Base URL of the solver. Serves both the HTTP API and the realtime channel.
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSettings {
    pub path: String,
    pub transports: Vec<TransportKind>,
    pub reconnection: bool,
    pub reconnection_attempts: u32,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            path: "/socket.io/".to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            reconnection: true,
            reconnection_attempts: 5,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
    pub flow_log_capacity: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 250,
            flow_log_capacity: 200,
        }
    }
}

/// Top-level configuration aggregating all sections.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GeosolveConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Returns the platform-specific config directory.
///
/// - Linux/macOS: `~/.config/geosolve/`
/// - Windows: `%APPDATA%\geosolve\`
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("geosolve");
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("geosolve");
        }
    }

    if let Some(home) = home_dir() {
        return home.join(".config").join("geosolve");
    }

    PathBuf::from(".geosolve")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Returns `~/.geosolve/`, home of logs and exports.
pub fn data_dir() -> PathBuf {
    if let Some(home) = home_dir() {
        home.join(".geosolve")
    } else {
        PathBuf::from(".geosolve")
    }
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Load configuration from the platform-specific path.
/// Creates the config file with defaults on first run.
pub fn load_or_create_config() -> GeosolveConfig {
    let path = config_path();

    if path.exists() {
        load_config(&path)
    } else {
        let config = GeosolveConfig::default();

        if let Err(e) = save_config(&config, &path) {
            tracing::warn!("Could not create default config at {:?}: {}", path, e);
        } else {
            tracing::info!("Created default config at {:?}", path);
        }

        config
    }
}

/// Load configuration from a TOML file.
/// Falls back to defaults if the file is missing or invalid.
pub fn load_config(path: &Path) -> GeosolveConfig {
    match try_load_config(path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(ConfigError::Io(_)) => {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            GeosolveConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
            GeosolveConfig::default()
        }
    }
}

pub fn try_load_config(path: &Path) -> Result<GeosolveConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Save configuration to a TOML file.
/// Creates parent directories if they don't exist.
pub fn save_config(config: &GeosolveConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
