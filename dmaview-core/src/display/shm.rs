//! Shared-memory pixels for the display-only demo
//!
//! The demo draws a solid color that drifts between red and blue each
//! frame, which exercises the window lifecycle without a capture device.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use crate::types::Resolution;

/// Bytes per XRGB8888 pixel
pub const BYTES_PER_PIXEL: u32 = 4;

/// Memfd-backed XRGB8888 pixels, mapped into our address space
#[derive(Debug)]
pub struct ShmPixels {
    fd: OwnedFd,
    ptr: *mut u8,
    len: usize,
    size: Resolution,
}

impl ShmPixels {
    pub fn new(size: Resolution) -> io::Result<Self> {
        let len = size.width as usize * size.height as usize * BYTES_PER_PIXEL as usize;
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty canvas"));
        }

        // SAFETY: the name is NUL-terminated and memfd_create returns a new
        // descriptor we own.
        let fd = unsafe {
            let fd = libc::memfd_create(
                b"dmaview-shm\0".as_ptr() as *const libc::c_char,
                libc::MFD_CLOEXEC,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            OwnedFd::from_raw_fd(fd)
        };

        // SAFETY: plain syscall on a descriptor we own.
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: maps `len` bytes of a file we just sized to `len`.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd,
            ptr: ptr as *mut u8,
            len,
            size,
        })
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    pub fn stride(&self) -> u32 {
        self.size.width * BYTES_PER_PIXEL
    }

    /// Mapping length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pixels(&self) -> &[u8] {
        // SAFETY: `ptr` maps `len` bytes for as long as `self` lives.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Paint every pixel with one color
    pub fn fill(&mut self, rgb: [u8; 3]) {
        let pixel = xrgb8888(rgb);
        for chunk in self.pixels_mut().chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel);
        }
    }
}

impl AsFd for ShmPixels {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for ShmPixels {
    fn drop(&mut self) {
        // SAFETY: unmapping the region mapped in `new`.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Little-endian XRGB8888 bytes for an RGB triple
pub fn xrgb8888(rgb: [u8; 3]) -> [u8; 4] {
    [rgb[2], rgb[1], rgb[0], 0xff]
}

/// The demo's drifting clear color
///
/// Red climbs while blue falls; each channel reverses once it leaves
/// 0..=255. Green stays put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCycle {
    red: i32,
    green: i32,
    blue: i32,
    red_step: i32,
    blue_step: i32,
}

impl Default for ColorCycle {
    fn default() -> Self {
        Self {
            red: 0x20,
            green: 0x70,
            blue: 0xa0,
            red_step: 1,
            blue_step: -1,
        }
    }
}

impl ColorCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current color
    pub fn color(&self) -> [u8; 3] {
        [
            self.red.clamp(0, 255) as u8,
            self.green.clamp(0, 255) as u8,
            self.blue.clamp(0, 255) as u8,
        ]
    }

    /// Advance one frame and return the new color
    pub fn step(&mut self) -> [u8; 3] {
        self.red += self.red_step;
        self.blue += self.blue_step;
        if !(0..=255).contains(&self.red) {
            self.red_step = -self.red_step;
        }
        if !(0..=255).contains(&self.blue) {
            self.blue_step = -self.blue_step;
        }
        self.color()
    }
}
