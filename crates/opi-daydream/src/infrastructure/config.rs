//! TOML configuration for the Daydream binding.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Linux:    `$XDG_CONFIG_HOME/opi-daydream/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/OpiDaydream/config.toml`
//! - Windows:  `%APPDATA%\OpiDaydream\config.toml`
//!
//! Every field has a default, so a missing file or a file with only some
//! sections works:
//!
//! ```toml
//! [device]
//! ip = "192.168.1.40"
//! port = 50008
//!
//! [calibration]
//! pixels_per_degree_x = 22.5
//! pixels_per_degree_y = 22.5
//! # lut = [ 256 cd/m² values, grey 0 first ]
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! The same module loads stimulus scripts for the `run` subcommand: a list
//! of `[[stimulus]]` tables whose fields may be absent (they are validated
//! when presented, not when loaded).

use std::path::{Path, PathBuf};
use std::time::Duration;

use opi_core::{LinearProjection, LuminanceTable, StaticStimulus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No path was given and the platform config directory is unknown.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the headset listens and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout of the reachability probe at start-up.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: f64,
    /// Timeout applied to every read and write once connected.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: f64,
}

/// Photometric and geometric calibration of the headset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationConfig {
    /// Measured cd/m² for grey levels 0..=255.  Absent → linear 0..=400.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lut: Option<LuminanceTable>,
    #[serde(default = "default_pixels_per_degree")]
    pub pixels_per_degree_x: f64,
    #[serde(default = "default_pixels_per_degree")]
    pub pixels_per_degree_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A `run` script: the stimuli to present, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StimulusScript {
    #[serde(default, rename = "stimulus")]
    pub stimuli: Vec<StaticStimulus>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    50008
}
fn default_probe_timeout_secs() -> f64 {
    10.0
}
fn default_io_timeout_secs() -> f64 {
    1000.0
}
fn default_pixels_per_degree() -> f64 {
    20.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            lut: None,
            pixels_per_degree_x: default_pixels_per_degree(),
            pixels_per_degree_y: default_pixels_per_degree(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DeviceConfig {
    /// `ip:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.ip.contains(':') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        secs(self.probe_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        secs(self.io_timeout_secs)
    }
}

impl CalibrationConfig {
    /// The configured table, or the linear 0..=400 cd/m² fallback.
    pub fn luminance_table(&self) -> LuminanceTable {
        self.lut.clone().unwrap_or_default()
    }

    pub fn projection(&self) -> LinearProjection {
        LinearProjection::new(self.pixels_per_degree_x, self.pixels_per_degree_y)
    }
}

/// Negative, NaN and overflowing values fall back to zero / the maximum
/// instead of panicking in `Duration::from_secs_f64`.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads `AppConfig` from `path`, or from the default location when `path`
/// is `None`.  A missing file yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed (including a `lut`
/// that does not have 256 finite values).
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Renders `config` as TOML, e.g. to seed a new config file.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] if serialization fails.
pub fn to_toml(config: &AppConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Loads the stimuli of a `run` script.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (a missing script
/// is an error) and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_stimulus_script(path: &Path) -> Result<Vec<StaticStimulus>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let script: StimulusScript = toml::from_str(&content)?;
    Ok(script.stimuli)
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OpiDaydream"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OpiDaydream")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("opi-daydream"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
