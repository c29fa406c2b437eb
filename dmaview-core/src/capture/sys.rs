//! Raw V4L2 kernel interface
//!
//! Mirrors the subset of `<linux/videodev2.h>` used for MMAP streaming and
//! DMA-BUF export. Layouts follow the kernel UAPI headers; the size tests at
//! the bottom pin them for 64-bit targets.

#![allow(non_camel_case_types)]
#![allow(dead_code)]

use bytemuck::Zeroable;
use std::ffi::{c_int, c_ulong, c_void};

use crate::types::MAX_PLANES;

// ioctl wrappers, `fn(fd, *mut T) -> nix::Result<c_int>`
nix::ioctl_read!(vidioc_querycap, b'V', 0, v4l2_capability);
nix::ioctl_readwrite!(vidioc_g_fmt, b'V', 4, v4l2_format);
nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, v4l2_requestbuffers);
nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_expbuf, b'V', 16, v4l2_exportbuffer);
nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, v4l2_buffer);
nix::ioctl_write_ptr!(vidioc_streamon, b'V', 18, c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, b'V', 19, c_int);

// Capability flags
pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;
pub const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

// enum v4l2_buf_type
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;

// enum v4l2_memory
pub const V4L2_MEMORY_MMAP: u32 = 1;

/// struct v4l2_capability
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

/// struct v4l2_pix_format
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// struct v4l2_plane_pix_format
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_plane_pix_format {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

/// struct v4l2_pix_format_mplane
///
/// Declared `packed` in the kernel, but every field is naturally aligned so
/// `repr(C)` yields the same layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_pix_format_mplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [v4l2_plane_pix_format; MAX_PLANES],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

/// The `fmt` union of struct v4l2_format
///
/// The kernel union also holds `struct v4l2_window`, whose pointers give the
/// union pointer alignment; `_align` reproduces that.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_fmt {
    pub pix: v4l2_pix_format,
    pub pix_mp: v4l2_pix_format_mplane,
    pub raw_data: [u8; 200],
    _align: *mut c_void,
}

/// struct v4l2_format
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_fmt,
}

/// struct v4l2_requestbuffers
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

/// struct v4l2_timecode
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

/// The `m` union of struct v4l2_plane
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_plane_m {
    pub mem_offset: u32,
    pub userptr: c_ulong,
    pub fd: i32,
}

/// struct v4l2_plane
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: v4l2_plane_m,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

/// The `m` union of struct v4l2_buffer
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut v4l2_plane,
    pub fd: i32,
}

/// struct v4l2_buffer
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

/// struct v4l2_exportbuffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct v4l2_exportbuffer {
    pub type_: u32,
    pub index: u32,
    pub plane: u32,
    pub flags: u32,
    pub fd: i32,
    pub reserved: [u32; 11],
}

// SAFETY: all-zero bytes are a valid value for every field of these unions
// and structs (integers, null pointers, zeroed timeval).
unsafe impl Zeroable for v4l2_format_fmt {}
unsafe impl Zeroable for v4l2_format {}
unsafe impl Zeroable for v4l2_plane_m {}
unsafe impl Zeroable for v4l2_plane {}
unsafe impl Zeroable for v4l2_buffer_m {}
unsafe impl Zeroable for v4l2_buffer {}

/// Map a plane count to the V4L2 buffer type
pub fn buffer_type(layout: crate::types::BufferLayout) -> u32 {
    match layout {
        crate::types::BufferLayout::SinglePlanar => V4L2_BUF_TYPE_VIDEO_CAPTURE,
        crate::types::BufferLayout::MultiPlanar => V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE,
    }
}

/// Read a NUL-padded string field such as `driver` or `card`
pub fn c_str_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
