//! Runtime configuration for dmaview
//!
//! [`StreamConfig`] is what the CLI hands to the pipeline: the file values
//! from [`ConfigFile`] with command-line overrides applied.

mod file;

pub use file::{CaptureSettings, ConfigFile, DisplaySettings, WindowSettings, sample_config};

use std::path::PathBuf;

use crate::error::{DmaviewError, Result};
use crate::formats::fourcc_to_string;
use crate::types::{MAX_PLANES, POOL_SIZE, Resolution};

/// Window settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    /// Initial size
    pub size: Resolution,
    /// Mark the whole window opaque
    pub opaque: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "dmaview".to_string(),
            size: Resolution::new(1280, 720),
            opaque: true,
        }
    }
}

/// Capture device and the format to import it as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub path: PathBuf,
    pub fourcc: u32,
}

/// Resolved settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Capture device; `None` runs the display-only demo
    pub device: Option<DeviceConfig>,
    /// Planes per buffer
    pub planes: u32,
    /// Buffers in the capture pool
    pub buffers: u32,
    pub window: WindowConfig,
    /// Longest idle wait per loop iteration in ms
    pub idle_wait_ms: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: None,
            planes: 1,
            buffers: POOL_SIZE as u32,
            window: WindowConfig::default(),
            idle_wait_ms: 4,
        }
    }
}

impl StreamConfig {
    /// Capture from `path`, importing as `fourcc`
    pub fn with_device(mut self, path: impl Into<PathBuf>, fourcc: u32) -> Self {
        self.device = Some(DeviceConfig {
            path: path.into(),
            fourcc,
        });
        self
    }

    pub fn with_planes(mut self, planes: u32) -> Self {
        self.planes = planes;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Override one or both window dimensions
    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        if let Some(width) = width {
            self.window.size.width = width;
        }
        if let Some(height) = height {
            self.window.size.height = height;
        }
        self
    }

    /// Whether this run captures from a device
    pub fn is_capture(&self) -> bool {
        self.device.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.planes == 0 || self.planes as usize > MAX_PLANES {
            return Err(DmaviewError::config(format!(
                "planes must be between 1 and {}, got {}",
                MAX_PLANES, self.planes
            )));
        }

        if self.buffers == 0 || self.buffers as usize > POOL_SIZE {
            return Err(DmaviewError::config(format!(
                "buffers must be between 1 and {}, got {}",
                POOL_SIZE, self.buffers
            )));
        }

        if self.window.size.width == 0 || self.window.size.height == 0 {
            return Err(DmaviewError::config(format!(
                "window size must be non-zero, got {}",
                self.window.size
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.device {
            Some(device) => write!(
                f,
                "{} as {} ({} planes, {} buffers)",
                device.path.display(),
                fourcc_to_string(device.fourcc),
                self.planes,
                self.buffers
            ),
            None => write!(f, "display-only demo"),
        }?;
        write!(f, ", window '{}' {}", self.window.title, self.window.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::fourcc;

    #[test]
    fn test_default_is_demo() {
        let config = StreamConfig::default();
        assert!(!config.is_capture());
        assert!(config.validate().is_ok());
        assert_eq!(config.window.size, Resolution::new(1280, 720));
    }

    #[test]
    fn test_overrides() {
        let config = StreamConfig::default()
            .with_device("/dev/video2", fourcc::NV12)
            .with_planes(2)
            .with_title("cam")
            .with_size(Some(640), None);

        assert!(config.is_capture());
        assert_eq!(config.planes, 2);
        assert_eq!(config.window.title, "cam");
        assert_eq!(config.window.size, Resolution::new(640, 720));
        assert_eq!(
            config.to_string(),
            "/dev/video2 as NV12 (2 planes, 4 buffers), window 'cam' 640x720"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StreamConfig::default().with_planes(0).validate().is_err());
        assert!(StreamConfig::default().with_planes(9).validate().is_err());
        assert!(
            StreamConfig::default()
                .with_size(Some(0), None)
                .validate()
                .is_err()
        );
    }
}
