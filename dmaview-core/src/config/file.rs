//! Configuration file loading
//!
//! Loads user configuration from `~/.config/dmaview/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{StreamConfig, WindowConfig};
use crate::error::{DmaviewError, Result};
use crate::formats::parse_fourcc;
use crate::types::Resolution;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Capture device settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Window settings
    #[serde(default)]
    pub window: WindowSettings,

    /// Event loop settings
    #[serde(default)]
    pub display: DisplaySettings,
}

/// Capture device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Device node used when none is given on the command line
    #[serde(default)]
    pub device: Option<String>,

    /// Fourcc used when none is given on the command line
    #[serde(default)]
    pub format: Option<String>,

    /// Planes per buffer (1 = single-plane API)
    #[serde(default = "default_planes")]
    pub planes: u32,
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Mark the whole window opaque
    #[serde(default = "default_true")]
    pub opaque: bool,
}

/// Event loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Longest idle wait per loop iteration in ms (0 = never wait)
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u32,
}

fn default_planes() -> u32 {
    1
}

fn default_title() -> String {
    "dmaview".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_true() -> bool {
    true
}

fn default_idle_wait_ms() -> u32 {
    4
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: None,
            format: None,
            planes: default_planes(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            opaque: true,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("dmaview").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("dmaview")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/dmaview/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| DmaviewError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DmaviewError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DmaviewError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| DmaviewError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Resolve into runtime settings
    ///
    /// The device and format only count when both are present.
    pub fn to_stream_config(&self) -> Result<StreamConfig> {
        let mut config = StreamConfig {
            planes: self.capture.planes,
            window: WindowConfig {
                title: self.window.title.clone(),
                size: Resolution::new(self.window.width, self.window.height),
                opaque: self.window.opaque,
            },
            idle_wait_ms: self.display.idle_wait_ms,
            ..StreamConfig::default()
        };

        match (&self.capture.device, &self.capture.format) {
            (Some(device), Some(format)) => {
                config = config.with_device(PathBuf::from(device), parse_fourcc(format)?);
            }
            (None, None) => {}
            _ => warn!("[capture] needs both device and format; ignoring the one given"),
        }

        Ok(config)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# dmaview configuration
# Command-line flags override every value here.

[capture]
# Device node and fourcc used when none are given on the command line.
# Both must be set to take effect.
# device = "/dev/video0"
# format = "NV12"

# Planes per buffer: 1 uses the single-plane API, 2 or more the
# multi-plane API (e.g. 2 for NV12M)
planes = 1

[window]
title = "dmaview"
width = 1280
height = 720

# Mark the whole window opaque so the compositor can skip blending
opaque = true

[display]
# Longest wait for device or compositor activity per loop iteration,
# in milliseconds (0 = never wait, spin)
idle_wait_ms = 4
"#
    .to_string()
}
