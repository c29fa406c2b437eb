//! Display side: the Wayland connection and the window
//!
//! This module handles:
//! - Connecting to the compositor and binding the globals we need
//! - The xdg-shell window and its configure/close state machine
//! - Submitting dmabuf imports and attaching the resulting buffers
//! - A shared-memory fallback used by the display-only demo
//!
//! Protocol callbacks never touch pipeline state directly. They are turned
//! into [`DisplayEvent`]s, which the pipeline drains once per loop
//! iteration.

pub mod shm;
pub mod surface;
pub mod wayland;

pub use shm::ColorCycle;
pub use surface::{SurfaceOps, SurfacePhase, WindowResource, WindowSurface};
pub use wayland::WaylandDisplay;

use std::os::fd::BorrowedFd;

use crate::error::Result;
use crate::import::{DmabufImporter, RequestId};
use crate::types::Resolution;

/// Something the compositor told us
#[derive(Debug)]
pub enum DisplayEvent<B> {
    /// xdg_toplevel.configure
    ToplevelConfigure { width: i32, height: i32 },
    /// xdg_surface.configure
    SurfaceConfigure { serial: u32 },
    /// xdg_toplevel.close
    CloseRequested,
    /// zwp_linux_dmabuf_v1.modifier
    FormatAdvertised {
        format: u32,
        modifier_hi: u32,
        modifier_lo: u32,
    },
    /// zwp_linux_buffer_params_v1.created
    ImportCreated { request: RequestId, buffer: B },
    /// zwp_linux_buffer_params_v1.failed
    ImportFailed { request: RequestId },
    /// wl_buffer.release for an imported buffer
    BufferReleased { request: RequestId },
    /// wl_registry.global_remove
    GlobalRemoved { name: u32 },
}

/// A compositor connection the pipeline can drive
pub trait DisplayBackend: SurfaceOps + DmabufImporter {
    /// Flush requests, read what the socket has without blocking, dispatch,
    /// and return the resulting events in arrival order
    fn dispatch_pending(&mut self) -> Result<Vec<DisplayEvent<Self::Buffer>>>;

    /// Attach an imported buffer, damage it whole, and commit
    fn attach(&mut self, buffer: &Self::Buffer, size: Resolution) -> Result<()>;

    /// Fill the window with a solid color and commit
    ///
    /// Returns false when the previous frame is still held by the
    /// compositor and nothing was drawn.
    fn present_color(&mut self, rgb: [u8; 3], size: Resolution) -> Result<bool>;

    /// Destroy a compositor buffer
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Final flush before the connection goes away
    fn disconnect(&mut self);

    /// Descriptor that becomes readable when events arrive
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}
