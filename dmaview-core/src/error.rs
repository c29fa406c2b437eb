//! Error types for dmaview

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using DmaviewError
pub type Result<T> = std::result::Result<T, DmaviewError>;

/// Main error type for dmaview operations
#[derive(Debug, Error)]
pub enum DmaviewError {
    /// The capture device could not be opened
    #[error("Failed to open video device {path:?}: {source}")]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device lacks streaming I/O or multi-plane capture
    #[error("Video device {path:?} is unsupported: {reason}")]
    UnsupportedDevice { path: PathBuf, reason: String },

    /// The device granted fewer buffers than requested
    #[error("VIDIOC_REQBUFS fell short: requested {requested} buffers, device granted {granted}")]
    InsufficientBuffers { requested: u32, granted: u32 },

    /// A plane could not be exported as a DMA-BUF handle
    #[error("VIDIOC_EXPBUF failed for buffer {buffer}, plane {plane}: {source}")]
    ExportFailed {
        buffer: u32,
        plane: u32,
        #[source]
        source: std::io::Error,
    },

    /// A device ioctl failed
    #[error("{name} failed: {source}")]
    Ioctl {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A capture buffer was asked to make an illegal state change
    #[error("Buffer {index} cannot move from {from} to {to}")]
    InvalidTransition {
        index: u32,
        from: &'static str,
        to: &'static str,
    },

    /// Could not reach the Wayland server or a required global is missing
    #[error("Display connection failed: {0}")]
    DisplayConnectionFailed(String),

    /// The compositor did not give us a surface
    #[error("Surface creation failed: {0}")]
    SurfaceCreationFailed(String),

    /// The compositor rejected a dmabuf import
    #[error("Import failed for buffer {buffer}")]
    ImportFailed { buffer: u32 },

    /// Protocol error while the loop is running
    #[error("Display error: {0}")]
    Display(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fourcc string could not be parsed
    #[error("Invalid pixel format: {0}")]
    InvalidFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DmaviewError>,
    },
}

impl DmaviewError {
    /// Create a display error
    pub fn display(msg: impl Into<String>) -> Self {
        Self::Display(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an ioctl error
    pub fn ioctl(name: &'static str, source: std::io::Error) -> Self {
        Self::Ioctl { name, source }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &DmaviewError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Process exit status for this failure class
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Self::DisplayConnectionFailed(_) => 2,
            Self::SurfaceCreationFailed(_) => 3,
            Self::DeviceOpenFailed { .. } => 4,
            Self::UnsupportedDevice { .. } => 5,
            Self::InsufficientBuffers { .. } => 6,
            Self::ExportFailed { .. } => 7,
            _ => 8,
        }
    }

    /// Whether the error ends the process or only degrades one buffer
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), Self::ImportFailed { .. })
    }

    /// Short operator-facing hint, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::DeviceOpenFailed { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                Some("Add your user to the 'video' group or check the device node permissions")
            }
            Self::DeviceOpenFailed { .. } => Some("Check the device path, e.g. `v4l2-ctl --list-devices`"),
            Self::UnsupportedDevice { .. } => {
                Some("The device must support streaming I/O; use --planes 1 for single-plane devices")
            }
            Self::InsufficientBuffers { .. } => {
                Some("Another process may hold the device's buffers; close other capture applications")
            }
            Self::ExportFailed { .. } => Some("The driver must support VIDIOC_EXPBUF (DMA-BUF export)"),
            Self::DisplayConnectionFailed(_) => {
                Some("Make sure a Wayland compositor is running and WAYLAND_DISPLAY is set")
            }
            Self::Config(_) => Some("Check ~/.config/dmaview/config.toml"),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<wayland_client::ConnectError> for DmaviewError {
    fn from(err: wayland_client::ConnectError) -> Self {
        Self::DisplayConnectionFailed(err.to_string())
    }
}

impl From<wayland_client::DispatchError> for DmaviewError {
    fn from(err: wayland_client::DispatchError) -> Self {
        Self::Display(format!("dispatch failed: {}", err))
    }
}

impl From<wayland_client::backend::WaylandError> for DmaviewError {
    fn from(err: wayland_client::backend::WaylandError) -> Self {
        Self::Display(err.to_string())
    }
}

impl From<toml::de::Error> for DmaviewError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config file: {}", err))
    }
}
