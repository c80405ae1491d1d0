//! TOML configuration for the device link.
//!
//! The file lives in the platform config directory:
//! - Linux:    `$XDG_CONFIG_HOME/remote-link/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/RemoteLink/config.toml`
//! - Windows:  `%APPDATA%\RemoteLink\config.toml`
//!
//! # Example file
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [network]
//! multicast_group = "239.255.250.250"
//! beacon_port = 9131
//! command_timeout_ms = 5000
//!
//! [devices]
//! default_device = "GlobalCache_000C1E024239"
//!
//! [[devices.known]]
//! id = "GlobalCache_000C1E024239"
//! address = "192.168.1.70"
//! name = "iTach-GlobalCache"
//! ```
//!
//! Every field carries a serde default, so a missing file, an empty file or
//! a file written by an older build all load cleanly.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field does not hold a usable IP address.
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery and command-channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Multicast group iTach units announce themselves on.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: String,
    /// UDP port beacons arrive on.
    #[serde(default = "default_beacon_port")]
    pub beacon_port: u16,
    /// Local address the beacon socket binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port of the device command service.
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long a sent command may wait for its response line.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Join `multicast_group` after binding.  Turn off to listen for
    /// unicast or broadcast beacons only.
    #[serde(default = "default_true")]
    pub join_multicast: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevicesConfig {
    /// Target for operations that name no device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_device: Option<String>,
    /// Devices remembered from earlier sessions.
    #[serde(default)]
    pub known: Vec<KnownDevice>,
}

/// A device registered at start-up without waiting for its beacon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownDevice {
    pub id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_multicast_group() -> String {
    "239.255.250.250".to_string()
}
fn default_beacon_port() -> u16 {
    9131
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_command_port() -> u16 {
    4998
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            beacon_port: default_beacon_port(),
            bind_address: default_bind_address(),
            command_port: default_command_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            join_multicast: default_true(),
        }
    }
}

impl NetworkConfig {
    /// Parses `multicast_group`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] unless the value is an IPv4
    /// multicast address.
    pub fn multicast_group_addr(&self) -> Result<Ipv4Addr, ConfigError> {
        self.multicast_group
            .parse::<Ipv4Addr>()
            .ok()
            .filter(Ipv4Addr::is_multicast)
            .ok_or_else(|| ConfigError::InvalidAddress {
                field: "multicast_group",
                value: self.multicast_group.clone(),
            })
    }

    /// Parses `bind_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the value is not an IPv4
    /// address.
    pub fn bind_addr(&self) -> Result<Ipv4Addr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "bind_address",
                value: self.bind_address.clone(),
            })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl KnownDevice {
    /// Parses `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the value is not an IP
    /// address.
    pub fn ip(&self) -> Result<IpAddr, ConfigError> {
        self.address.parse().map_err(|_| ConfigError::InvalidAddress {
            field: "device",
            value: self.address.clone(),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Writes the config to the platform path.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RemoteLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("remote-link"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RemoteLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
