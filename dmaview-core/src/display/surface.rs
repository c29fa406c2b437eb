//! Top-level window state machine
//!
//! Follows the xdg-shell configure handshake: a toplevel configure proposes
//! a size, the surface configure that closes the sequence is acknowledged,
//! and only then is the proposed size applied. Resizes are coalesced, so a
//! burst of configures produces at most one resize per acknowledged
//! sequence.

use tracing::{debug, info};

use crate::types::Resolution;

/// Compositor objects that make up the window, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowResource {
    Surface,
    XdgSurface,
    Toplevel,
}

/// Where the window is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfacePhase {
    /// Created, waiting for the first configure
    Unconfigured,
    /// Acknowledged, ready to present
    Configured,
    /// A new size has been proposed but not yet acknowledged
    Resized,
    /// The compositor asked us to close
    Closing,
    /// Resources released
    Destroyed,
}

/// Protocol requests the state machine issues
pub trait SurfaceOps {
    /// Acknowledge a surface configure
    fn ack_configure(&mut self, serial: u32);

    /// Apply a new window size (opaque region, buffer sizing)
    fn resize(&mut self, size: Resolution);

    /// Commit pending surface state
    fn commit(&mut self);

    /// Destroy one window resource
    fn release(&mut self, resource: WindowResource);
}

/// The window's configure/resize/close state
#[derive(Debug)]
pub struct WindowSurface {
    size: Resolution,
    pending_size: Option<Resolution>,
    last_serial: Option<u32>,
    phase: SurfacePhase,
    resources: Vec<WindowResource>,
    resize_count: u64,
}

impl WindowSurface {
    /// A window that will start at `size`
    pub fn new(size: Resolution) -> Self {
        Self {
            size,
            pending_size: None,
            last_serial: None,
            phase: SurfacePhase::Unconfigured,
            resources: Vec::new(),
            resize_count: 0,
        }
    }

    /// Note that a resource now exists and must be released on destroy
    pub fn record_created(&mut self, resource: WindowResource) {
        self.resources.push(resource);
    }

    /// Toplevel configure: a proposed size
    ///
    /// A zero dimension leaves that dimension to us, so (0, 0) proposes
    /// nothing. Only the latest proposal is kept.
    pub fn on_toplevel_configure(&mut self, width: i32, height: i32) {
        if self.is_closing() {
            return;
        }

        if width <= 0 && height <= 0 {
            debug!("Toplevel configure without a size, keeping {}", self.size);
            self.pending_size = None;
            return;
        }

        let proposed = Resolution::new(
            if width > 0 { width as u32 } else { self.size.width },
            if height > 0 { height as u32 } else { self.size.height },
        );

        if proposed == self.size {
            self.pending_size = None;
            if self.phase == SurfacePhase::Resized {
                self.phase = SurfacePhase::Configured;
            }
            return;
        }

        self.pending_size = Some(proposed);
        if self.phase == SurfacePhase::Configured {
            self.phase = SurfacePhase::Resized;
        }
    }

    /// Surface configure: acknowledge, then apply any pending size
    pub fn on_configure<O: SurfaceOps>(&mut self, serial: u32, ops: &mut O) {
        if self.phase == SurfacePhase::Destroyed {
            return;
        }

        ops.ack_configure(serial);
        self.last_serial = Some(serial);

        if self.phase == SurfacePhase::Unconfigured {
            info!("Window configured at {}", self.size);
            self.phase = SurfacePhase::Configured;
        }

        if let Some(size) = self.pending_size.take() {
            if size != self.size {
                info!("Window resized {} -> {}", self.size, size);
                self.size = size;
                ops.resize(size);
                ops.commit();
                self.resize_count += 1;
            }
        }

        if self.phase == SurfacePhase::Resized {
            self.phase = SurfacePhase::Configured;
        }
    }

    /// The compositor asked the window to close
    pub fn on_close(&mut self) {
        if matches!(self.phase, SurfacePhase::Closing | SurfacePhase::Destroyed) {
            return;
        }
        info!("Window close requested");
        self.phase = SurfacePhase::Closing;
    }

    /// Release resources in reverse creation order
    pub fn destroy<O: SurfaceOps>(&mut self, ops: &mut O) {
        if self.phase == SurfacePhase::Destroyed {
            return;
        }
        while let Some(resource) = self.resources.pop() {
            debug!("Releasing {:?}", resource);
            ops.release(resource);
        }
        self.phase = SurfacePhase::Destroyed;
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    pub fn pending_size(&self) -> Option<Resolution> {
        self.pending_size
    }

    pub fn phase(&self) -> SurfacePhase {
        self.phase
    }

    /// Serial of the last acknowledged configure
    pub fn last_serial(&self) -> Option<u32> {
        self.last_serial
    }

    /// Resizes applied so far
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// A buffer may be attached
    pub fn can_present(&self) -> bool {
        matches!(self.phase, SurfacePhase::Configured | SurfacePhase::Resized)
    }

    pub fn is_closing(&self) -> bool {
        matches!(self.phase, SurfacePhase::Closing | SurfacePhase::Destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ops {
        acks: Vec<u32>,
        resizes: Vec<Resolution>,
        commits: usize,
        released: Vec<WindowResource>,
    }

    impl SurfaceOps for Ops {
        fn ack_configure(&mut self, serial: u32) {
            self.acks.push(serial);
        }
        fn resize(&mut self, size: Resolution) {
            self.resizes.push(size);
        }
        fn commit(&mut self) {
            self.commits += 1;
        }
        fn release(&mut self, resource: WindowResource) {
            self.released.push(resource);
        }
    }

    #[test]
    fn test_first_configure() {
        let mut window = WindowSurface::new(Resolution::new(1280, 720));
        let mut ops = Ops::default();
        assert!(!window.can_present());

        window.on_configure(1, &mut ops);
        assert_eq!(window.phase(), SurfacePhase::Configured);
        assert_eq!(ops.acks, vec![1]);
        assert!(ops.resizes.is_empty());
        assert!(window.can_present());
    }

    #[test]
    fn test_partial_size_keeps_other_dimension() {
        let mut window = WindowSurface::new(Resolution::new(1280, 720));
        let mut ops = Ops::default();

        window.on_toplevel_configure(0, 500);
        window.on_configure(1, &mut ops);
        assert_eq!(window.size(), Resolution::new(1280, 500));
    }

    #[test]
    fn test_coalesces_to_latest() {
        let mut window = WindowSurface::new(Resolution::new(800, 600));
        let mut ops = Ops::default();
        window.on_configure(1, &mut ops);

        window.on_toplevel_configure(1024, 768);
        assert_eq!(window.phase(), SurfacePhase::Resized);
        window.on_toplevel_configure(1920, 1080);
        window.on_configure(2, &mut ops);

        assert_eq!(ops.resizes, vec![Resolution::new(1920, 1080)]);
        assert_eq!(window.phase(), SurfacePhase::Configured);
    }

    #[test]
    fn test_proposal_back_to_current_cancels() {
        let mut window = WindowSurface::new(Resolution::new(800, 600));
        let mut ops = Ops::default();
        window.on_configure(1, &mut ops);

        window.on_toplevel_configure(1024, 768);
        window.on_toplevel_configure(800, 600);
        window.on_configure(2, &mut ops);
        assert!(ops.resizes.is_empty());
    }

    #[test]
    fn test_close_then_destroy_reverse_order() {
        let mut window = WindowSurface::new(Resolution::new(640, 480));
        let mut ops = Ops::default();
        window.record_created(WindowResource::Surface);
        window.record_created(WindowResource::XdgSurface);
        window.record_created(WindowResource::Toplevel);
        window.on_configure(1, &mut ops);

        window.on_close();
        assert!(window.is_closing());
        assert!(!window.can_present());

        // Configures after close change nothing
        window.on_toplevel_configure(100, 100);
        assert_eq!(window.pending_size(), None);

        window.destroy(&mut ops);
        assert_eq!(
            ops.released,
            vec![
                WindowResource::Toplevel,
                WindowResource::XdgSurface,
                WindowResource::Surface
            ]
        );
        assert_eq!(window.phase(), SurfacePhase::Destroyed);

        window.destroy(&mut ops);
        assert_eq!(ops.released.len(), 3);
    }
}
