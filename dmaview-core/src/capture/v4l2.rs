//! V4L2 device node driven through the `nix` ioctl wrappers

use std::ffi::c_int;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use tracing::{debug, trace};

use super::sys;
use super::{ActiveFormat, BufferInfo, CaptureIo, DeviceCapabilities, PlaneInfo};
use crate::error::{DmaviewError, Result};
use crate::types::{BufferLayout, FilledFrame, MAX_PLANES, Resolution};

/// Run an ioctl wrapper, retrying when interrupted by a signal
fn xioctl(mut call: impl FnMut() -> nix::Result<c_int>) -> io::Result<()> {
    loop {
        match call() {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno.into()),
        }
    }
}

/// An open V4L2 capture node
///
/// Opened non-blocking, so a dequeue with no filled buffer reports "not
/// ready" instead of stalling the event loop.
#[derive(Debug)]
pub struct V4l2Device {
    fd: OwnedFd,
    path: PathBuf,
}

impl V4l2Device {
    /// Open a device node read-write
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| DmaviewError::DeviceOpenFailed {
                path: path.clone(),
                source,
            })?;

        debug!("Opened {:?} as fd {}", path, file.as_raw_fd());
        Ok(Self {
            fd: file.into(),
            path,
        })
    }

    /// Device node path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn raw(&self) -> c_int {
        self.fd.as_raw_fd()
    }
}

/// A zeroed v4l2_buffer addressed at `index`, with the plane array wired in
/// for the multi-plane API.
fn buffer_request(
    layout: BufferLayout,
    index: u32,
    planes: u32,
    plane_array: &mut [sys::v4l2_plane; MAX_PLANES],
) -> sys::v4l2_buffer {
    let mut buf: sys::v4l2_buffer = bytemuck::Zeroable::zeroed();
    buf.index = index;
    buf.type_ = sys::buffer_type(layout);
    buf.memory = sys::V4L2_MEMORY_MMAP;
    if layout == BufferLayout::MultiPlanar {
        buf.length = planes.min(MAX_PLANES as u32);
        buf.m.planes = plane_array.as_mut_ptr();
    }
    buf
}

impl CaptureIo for V4l2Device {
    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        let mut cap: sys::v4l2_capability = bytemuck::Zeroable::zeroed();
        // SAFETY: every call below passes a live struct of the size the
        // request encodes, and pointers inside it outlive the call.
        xioctl(|| unsafe { sys::vidioc_querycap(self.raw(), &mut cap) })?;

        let capabilities = if cap.capabilities & sys::V4L2_CAP_DEVICE_CAPS != 0 {
            cap.device_caps
        } else {
            cap.capabilities
        };

        Ok(DeviceCapabilities {
            driver: sys::c_str_field(&cap.driver),
            card: sys::c_str_field(&cap.card),
            bus_info: sys::c_str_field(&cap.bus_info),
            capabilities,
        })
    }

    fn get_format(&mut self, layout: BufferLayout) -> io::Result<ActiveFormat> {
        let mut fmt: sys::v4l2_format = bytemuck::Zeroable::zeroed();
        fmt.type_ = sys::buffer_type(layout);
        xioctl(|| unsafe { sys::vidioc_g_fmt(self.raw(), &mut fmt) })?;

        // SAFETY: the driver filled the union member selected by `type_`.
        let active = unsafe {
            match layout {
                BufferLayout::SinglePlanar => {
                    let pix = fmt.fmt.pix;
                    ActiveFormat {
                        fourcc: pix.pixelformat,
                        resolution: Resolution::new(pix.width, pix.height),
                        strides: vec![pix.bytesperline],
                    }
                }
                BufferLayout::MultiPlanar => {
                    let mp = fmt.fmt.pix_mp;
                    let count = (mp.num_planes as usize).clamp(1, MAX_PLANES);
                    ActiveFormat {
                        fourcc: mp.pixelformat,
                        resolution: Resolution::new(mp.width, mp.height),
                        strides: mp.plane_fmt[..count].iter().map(|p| p.bytesperline).collect(),
                    }
                }
            }
        };
        Ok(active)
    }

    fn request_buffers(&mut self, layout: BufferLayout, count: u32) -> io::Result<u32> {
        let mut req: sys::v4l2_requestbuffers = bytemuck::Zeroable::zeroed();
        req.count = count;
        req.type_ = sys::buffer_type(layout);
        req.memory = sys::V4L2_MEMORY_MMAP;
        xioctl(|| unsafe { sys::vidioc_reqbufs(self.raw(), &mut req) })?;
        Ok(req.count)
    }

    fn query_buffer(&mut self, layout: BufferLayout, index: u32, planes: u32) -> io::Result<BufferInfo> {
        let mut plane_array: [sys::v4l2_plane; MAX_PLANES] = bytemuck::Zeroable::zeroed();
        let mut buf = buffer_request(layout, index, planes, &mut plane_array);
        xioctl(|| unsafe { sys::vidioc_querybuf(self.raw(), &mut buf) })?;

        let planes = match layout {
            // SAFETY: MMAP buffers report their mapping offset in `m.offset`.
            BufferLayout::SinglePlanar => vec![PlaneInfo {
                length: buf.length,
                offset: unsafe { buf.m.offset },
            }],
            BufferLayout::MultiPlanar => plane_array[..(buf.length as usize).min(MAX_PLANES)]
                .iter()
                // SAFETY: as above, per plane in `m.mem_offset`.
                .map(|p| PlaneInfo {
                    length: p.length,
                    offset: unsafe { p.m.mem_offset },
                })
                .collect(),
        };

        Ok(BufferInfo { index, planes })
    }

    fn queue_buffer(&mut self, layout: BufferLayout, index: u32, planes: u32) -> io::Result<()> {
        let mut plane_array: [sys::v4l2_plane; MAX_PLANES] = bytemuck::Zeroable::zeroed();
        let mut buf = buffer_request(layout, index, planes, &mut plane_array);
        xioctl(|| unsafe { sys::vidioc_qbuf(self.raw(), &mut buf) })
    }

    fn export_plane(&mut self, layout: BufferLayout, index: u32, plane: u32) -> io::Result<OwnedFd> {
        let mut exp: sys::v4l2_exportbuffer = bytemuck::Zeroable::zeroed();
        exp.type_ = sys::buffer_type(layout);
        exp.index = index;
        exp.plane = plane;
        exp.flags = libc::O_CLOEXEC as u32;
        xioctl(|| unsafe { sys::vidioc_expbuf(self.raw(), &mut exp) })?;

        if exp.fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "driver returned an invalid descriptor",
            ));
        }
        // SAFETY: EXPBUF hands us a fresh descriptor that nothing else owns.
        Ok(unsafe { OwnedFd::from_raw_fd(exp.fd) })
    }

    fn stream_on(&mut self, layout: BufferLayout) -> io::Result<()> {
        let buf_type = sys::buffer_type(layout) as c_int;
        xioctl(|| unsafe { sys::vidioc_streamon(self.raw(), &buf_type) })
    }

    fn stream_off(&mut self, layout: BufferLayout) -> io::Result<()> {
        let buf_type = sys::buffer_type(layout) as c_int;
        xioctl(|| unsafe { sys::vidioc_streamoff(self.raw(), &buf_type) })
    }

    fn dequeue_buffer(&mut self, layout: BufferLayout, planes: u32) -> io::Result<Option<FilledFrame>> {
        let mut plane_array: [sys::v4l2_plane; MAX_PLANES] = bytemuck::Zeroable::zeroed();
        let mut buf = buffer_request(layout, 0, planes, &mut plane_array);

        match xioctl(|| unsafe { sys::vidioc_dqbuf(self.raw(), &mut buf) }) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e),
        }

        let bytes_used = match layout {
            BufferLayout::SinglePlanar => buf.bytesused,
            BufferLayout::MultiPlanar => plane_array[0].bytesused,
        };
        trace!(
            "Dequeued buffer {} seq {} ({} bytes)",
            buf.index, buf.sequence, bytes_used
        );

        Ok(Some(FilledFrame {
            index: buf.index,
            sequence: buf.sequence,
            bytes_used,
        }))
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.fd.as_fd())
    }
}
