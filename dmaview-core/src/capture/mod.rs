//! Video capture via V4L2 with DMA-BUF export
//!
//! This module handles:
//! - Capability and format queries on a capture node
//! - A fixed pool of MMAP buffers, exported plane by plane as DMA-BUF handles
//! - Streaming control and the dequeue/requeue cycle
//!
//! All device access goes through [`CaptureIo`], so the buffer bookkeeping in
//! [`CaptureDevice`] can be driven by a fake device in tests.

pub mod device;
pub mod pool;
pub mod sys;
pub mod v4l2;

pub use device::CaptureDevice;
pub use pool::{BufferPool, BufferState, CaptureBuffer};
pub use v4l2::V4l2Device;

use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

use crate::types::{BufferLayout, FilledFrame, Resolution};

/// Result of a capability query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Effective capability bits (device caps when the driver reports them)
    pub capabilities: u32,
}

impl DeviceCapabilities {
    /// Supports the streaming I/O method
    pub fn can_stream(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_STREAMING != 0
    }

    /// Supports the single-plane capture API
    pub fn can_capture(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_VIDEO_CAPTURE != 0
    }

    /// Supports the multi-plane capture API
    pub fn can_capture_mplane(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_VIDEO_CAPTURE_MPLANE != 0
    }
}

/// The format currently active on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFormat {
    pub fourcc: u32,
    pub resolution: Resolution,
    /// Bytes per line, one entry per plane the driver describes
    pub strides: Vec<u32>,
}

impl ActiveFormat {
    /// Stride of plane 0
    pub fn stride(&self) -> u32 {
        self.strides.first().copied().unwrap_or(0)
    }
}

/// Location of one plane inside the device's buffer memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneInfo {
    pub length: u32,
    pub offset: u32,
}

/// Result of a buffer query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub index: u32,
    pub planes: Vec<PlaneInfo>,
}

/// Device operations needed by the capture pipeline
///
/// One method per ioctl. Errors are raw OS errors; [`CaptureDevice`] attaches
/// the ioctl name and maps them to the crate's error classes.
pub trait CaptureIo {
    /// VIDIOC_QUERYCAP
    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities>;

    /// VIDIOC_G_FMT
    fn get_format(&mut self, layout: BufferLayout) -> io::Result<ActiveFormat>;

    /// VIDIOC_REQBUFS; returns the number of buffers granted. A count of 0
    /// releases every buffer.
    fn request_buffers(&mut self, layout: BufferLayout, count: u32) -> io::Result<u32>;

    /// VIDIOC_QUERYBUF
    fn query_buffer(&mut self, layout: BufferLayout, index: u32, planes: u32) -> io::Result<BufferInfo>;

    /// VIDIOC_QBUF
    fn queue_buffer(&mut self, layout: BufferLayout, index: u32, planes: u32) -> io::Result<()>;

    /// VIDIOC_EXPBUF for one plane
    fn export_plane(&mut self, layout: BufferLayout, index: u32, plane: u32) -> io::Result<OwnedFd>;

    /// VIDIOC_STREAMON
    fn stream_on(&mut self, layout: BufferLayout) -> io::Result<()>;

    /// VIDIOC_STREAMOFF
    fn stream_off(&mut self, layout: BufferLayout) -> io::Result<()>;

    /// VIDIOC_DQBUF; `None` when no buffer is ready yet
    fn dequeue_buffer(&mut self, layout: BufferLayout, planes: u32) -> io::Result<Option<FilledFrame>>;

    /// Descriptor to poll for frame readiness, if there is one
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}
