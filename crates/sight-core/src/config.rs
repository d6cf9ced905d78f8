//! Configuration system for the sight service.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SIGHT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/sight/config.toml
//!   3. ~/.config/sight/config.toml
//!
//! Firewall policy and quota limits are not part of this file. They live in
//! the preference store so the UI process can change them at run time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SightConfig {
    pub bridge: BridgeConfig,
    pub control: ControlConfig,
    pub firewall: FirewallConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// TCP address of the pump bridge. Empty = no pump link.
    pub address: String,
    /// Per-exchange timeout in milliseconds.
    pub exchange_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// UDP address on which control strings are received.
    pub listen_addr: String,
    /// UDP address of the UI process, target of authorization requests.
    pub ui_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// JSON preference file backing policy flags and quota records.
    pub preferences_path: PathBuf,
    /// How long a command waits for a user decision.
    pub auth_timeout_ms: u64,
    /// Granularity at which a waiting command re-checks for a decision.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Seconds between status fetches. 0 = never.
    pub interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            exchange_timeout_ms: 5_000,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7410".to_string(),
            ui_addr: "127.0.0.1:7411".to_string(),
        }
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            preferences_path: data_dir().join("preferences.json"),
            auth_timeout_ms: 20_000,
            poll_interval_ms: 500,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

// ── Path helpers ─────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("sight")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("sight")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl SightConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            SightConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SIGHT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&SightConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SIGHT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SIGHT_BRIDGE__ADDRESS") {
            self.bridge.address = v;
        }
        if let Ok(v) = std::env::var("SIGHT_CONTROL__LISTEN_ADDR") {
            self.control.listen_addr = v;
        }
        if let Ok(v) = std::env::var("SIGHT_CONTROL__UI_ADDR") {
            self.control.ui_addr = v;
        }
        if let Ok(v) = std::env::var("SIGHT_FIREWALL__PREFERENCES_PATH") {
            self.firewall.preferences_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SIGHT_FIREWALL__AUTH_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.firewall.auth_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("SIGHT_STATUS__INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.status.interval_secs = secs;
            }
        }
    }
}
