//! Core types for dmaview
//!
//! These types cross the boundary between the capture side and the display
//! side of the pipeline.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// Number of buffers in the capture pool
pub const POOL_SIZE: usize = 4;

/// Upper bound on planes per buffer (VIDEO_MAX_PLANES)
pub const MAX_PLANES: usize = 8;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the device lays out a frame in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLayout {
    /// One memory region per frame (V4L2_BUF_TYPE_VIDEO_CAPTURE)
    SinglePlanar,
    /// One memory region per plane (V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE)
    MultiPlanar,
}

impl BufferLayout {
    /// Pick the layout for a requested plane count
    pub fn for_planes(plane_count: u32) -> Self {
        if plane_count > 1 {
            Self::MultiPlanar
        } else {
            Self::SinglePlanar
        }
    }
}

impl std::fmt::Display for BufferLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinglePlanar => write!(f, "single-plane"),
            Self::MultiPlanar => write!(f, "multi-plane"),
        }
    }
}

/// A DMA-BUF handle for one plane of a capture buffer
///
/// The file descriptor is owned: it is closed exactly once, when this value
/// is dropped. Moving it into the import bridge transfers that duty.
#[derive(Debug)]
pub struct ExportedPlane {
    /// Plane index within the buffer
    pub plane: u32,
    /// Plane length in bytes, as reported by the device
    pub length: u32,
    fd: OwnedFd,
}

impl ExportedPlane {
    pub fn new(plane: u32, length: u32, fd: OwnedFd) -> Self {
        Self { plane, length, fd }
    }
}

impl AsFd for ExportedPlane {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// All exported planes of one capture buffer
#[derive(Debug)]
pub struct ExportedBuffer {
    /// Buffer index in the capture pool
    pub index: u32,
    /// One handle per negotiated plane, in plane order
    pub planes: Vec<ExportedPlane>,
}

/// A buffer the device has filled and handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilledFrame {
    /// Buffer index in the capture pool
    pub index: u32,
    /// Driver sequence number
    pub sequence: u32,
    /// Bytes of payload in plane 0
    pub bytes_used: u32,
}
