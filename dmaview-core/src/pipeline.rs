//! Capture-to-display pipeline
//!
//! Owns the capture device, the import bridge, the window state machine and
//! the display connection, and drives them from a single-threaded loop.
//!
//! Each loop iteration:
//! 1. Flushes and reads the display socket without blocking
//! 2. Applies the resulting events (configure, close, imports, releases)
//! 3. Presents the next frame if the window is configured
//! 4. Optionally waits a bounded time for either descriptor to wake up
//!
//! The loop ends once the window enters its closing phase. Shutdown then
//! releases display resources before the device: imported buffers, the
//! toplevel, the xdg surface, the surface, the connection, and finally the
//! capture stream and its buffers.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::capture::{BufferState, CaptureDevice, CaptureIo, V4l2Device};
use crate::display::{ColorCycle, DisplayBackend, DisplayEvent, WindowSurface};
use crate::error::{DmaviewError, Result};
use crate::import::ImportBridge;
use crate::types::ExportedBuffer;

/// Where frames come from
pub enum FrameSource<D: CaptureIo = V4l2Device> {
    /// A V4L2 device with exported buffers
    Capture(CaptureDevice<D>),
    /// A solid color drifting between red and blue
    Demo(ColorCycle),
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, stream not started
    Idle,
    /// Loop running
    Running,
    /// Close requested, loop about to exit
    Closing,
    /// Resources released
    Stopped,
}

/// The pipeline context
pub struct Pipeline<B: DisplayBackend, D: CaptureIo = V4l2Device> {
    display: B,
    window: WindowSurface,
    bridge: ImportBridge<B::Buffer>,
    source: FrameSource<D>,
    state: PipelineState,
    /// Set once the window starts closing; never cleared
    done: bool,
    /// Capture buffer currently attached to the surface
    displayed: Option<u32>,
    idle_wait_ms: u32,
    iterations: u64,
    frames_presented: u64,
    frames_dropped: u64,
    imports_failed: u64,
    start_time: Option<Instant>,
}

impl<B: DisplayBackend, D: CaptureIo> Pipeline<B, D> {
    /// Assemble a pipeline around an already-created window
    ///
    /// # Arguments
    /// * `display` - Connected display backend
    /// * `window` - State machine for the window `display` created
    /// * `source` - Capture device or demo color
    /// * `idle_wait_ms` - Upper bound on each idle wait; 0 never waits
    pub fn new(display: B, window: WindowSurface, source: FrameSource<D>, idle_wait_ms: u32) -> Self {
        Self {
            display,
            window,
            bridge: ImportBridge::new(),
            source,
            state: PipelineState::Idle,
            done: false,
            displayed: None,
            idle_wait_ms,
            iterations: 0,
            frames_presented: 0,
            frames_dropped: 0,
            imports_failed: 0,
            start_time: None,
        }
    }

    /// Submit one import request per exported buffer
    ///
    /// Every plane is imported with the operator's fourcc and the device's
    /// plane 0 stride. Returns the number of requests submitted.
    pub fn import_buffers(&mut self, exported: Vec<ExportedBuffer>) -> Result<usize> {
        let FrameSource::Capture(capture) = &self.source else {
            return Err(DmaviewError::config("demo pipeline has no buffers to import"));
        };
        let resolution = capture.resolution();
        let format = capture.requested_format();
        let stride = capture.stride();

        let mut submitted = 0;
        for buffer in exported {
            self.bridge
                .request_import(&mut self.display, buffer, resolution, format, stride)?;
            submitted += 1;
        }
        info!("Submitted {} import requests", submitted);
        Ok(submitted)
    }

    /// Start the capture stream and mark the loop running
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Ok(());
        }
        if let FrameSource::Capture(capture) = &mut self.source {
            capture.start_streaming()?;
        }
        self.state = PipelineState::Running;
        self.start_time = Some(Instant::now());
        Ok(())
    }

    /// Run until the window closes
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        while !self.done {
            self.run_once()?;
        }
        info!("{}", self.stats());
        Ok(())
    }

    /// One loop iteration
    pub fn run_once(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.iterations += 1;

        let events = self.display.dispatch_pending()?;
        for event in events {
            self.handle_event(event);
        }

        if self.window.is_closing() {
            self.done = true;
            self.state = PipelineState::Closing;
            return Ok(());
        }

        if self.window.can_present() {
            if let Err(e) = self.present() {
                warn!("Present step failed: {}", e);
            }
        }

        self.idle_wait()
    }

    fn handle_event(&mut self, event: DisplayEvent<B::Buffer>) {
        match event {
            DisplayEvent::ToplevelConfigure { width, height } => {
                self.window.on_toplevel_configure(width, height);
            }
            DisplayEvent::SurfaceConfigure { serial } => {
                self.window.on_configure(serial, &mut self.display);
            }
            DisplayEvent::CloseRequested => {
                self.window.on_close();
            }
            DisplayEvent::FormatAdvertised {
                format,
                modifier_hi,
                modifier_lo,
            } => {
                self.bridge
                    .on_format_advertised(format, modifier_hi, modifier_lo);
            }
            DisplayEvent::ImportCreated { request, buffer } => {
                if let Err(orphan) = self.bridge.on_created(request, buffer) {
                    self.display.destroy_buffer(orphan);
                }
            }
            DisplayEvent::ImportFailed { request } => {
                if self.bridge.on_failed(request).is_some() {
                    self.imports_failed += 1;
                }
            }
            DisplayEvent::BufferReleased { request } => {
                if let Some(index) = self.bridge.buffer_for(request) {
                    if let Err(e) = self.on_buffer_released(index) {
                        warn!("Failed to requeue buffer {}: {}", index, e);
                    }
                }
            }
            DisplayEvent::GlobalRemoved { name } => {
                warn!("Compositor removed global {}", name);
            }
        }
    }

    fn on_buffer_released(&mut self, index: u32) -> Result<()> {
        let FrameSource::Capture(capture) = &mut self.source else {
            return Ok(());
        };
        if capture.buffer_state(index) != Some(BufferState::Displayed) {
            return Ok(());
        }

        trace!("Buffer {} released by compositor", index);
        capture.requeue(index)?;
        if self.displayed == Some(index) {
            self.displayed = None;
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        match &mut self.source {
            FrameSource::Demo(cycle) => {
                let color = cycle.step();
                if self.display.present_color(color, self.window.size())? {
                    self.frames_presented += 1;
                }
            }
            FrameSource::Capture(capture) => {
                let Some(frame) = capture.dequeue_filled()? else {
                    return Ok(());
                };

                match self.bridge.surface_for(frame.index) {
                    Some(buffer) => {
                        if let Err(e) = self.display.attach(buffer, capture.resolution()) {
                            // Keep the buffer in rotation
                            capture.requeue(frame.index)?;
                            self.frames_dropped += 1;
                            return Err(e);
                        }
                        capture.mark_displayed(frame.index)?;
                        self.displayed = Some(frame.index);
                        self.frames_presented += 1;
                        trace!("Presented buffer {} (seq {})", frame.index, frame.sequence);
                    }
                    None => {
                        // Import pending or failed: hand the frame straight back
                        capture.requeue(frame.index)?;
                        self.frames_dropped += 1;
                        trace!("Dropped buffer {}, no compositor buffer", frame.index);
                    }
                }
            }
        }
        Ok(())
    }

    fn idle_wait(&self) -> Result<()> {
        if self.idle_wait_ms == 0 {
            return Ok(());
        }

        let mut fds: Vec<BorrowedFd<'_>> = Vec::with_capacity(2);
        if let Some(fd) = self.display.poll_fd() {
            fds.push(fd);
        }
        // With nothing queued the device reports POLLERR at once
        if let FrameSource::Capture(capture) = &self.source {
            if capture.is_streaming() && capture.queued_count() > 0 {
                if let Some(fd) = capture.poll_fd() {
                    fds.push(fd);
                }
            }
        }

        wait_readable(&fds, self.idle_wait_ms)?;
        Ok(())
    }

    /// Release everything, display side first
    ///
    /// Safe to call more than once; dropping the pipeline calls it too.
    pub fn shutdown(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.state = PipelineState::Stopped;
        debug!("Shutting down pipeline");

        for (index, buffer) in self.bridge.take_buffers() {
            trace!("Destroying compositor buffer for capture buffer {}", index);
            self.display.destroy_buffer(buffer);
        }
        self.bridge.clear();

        self.window.destroy(&mut self.display);
        self.display.disconnect();

        if let FrameSource::Capture(capture) = &mut self.source {
            capture.close();
        }
        self.displayed = None;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn window(&self) -> &WindowSurface {
        &self.window
    }

    pub fn bridge(&self) -> &ImportBridge<B::Buffer> {
        &self.bridge
    }

    pub fn display(&self) -> &B {
        &self.display
    }

    pub fn source(&self) -> &FrameSource<D> {
        &self.source
    }

    /// Capture buffer currently on screen
    pub fn displayed(&self) -> Option<u32> {
        self.displayed
    }

    /// Get pipeline statistics
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            state: self.state,
            iterations: self.iterations,
            frames_presented: self.frames_presented,
            frames_dropped: self.frames_dropped,
            imports_failed: self.imports_failed,
            elapsed_seconds: self
                .start_time
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }
}

impl<B: DisplayBackend, D: CaptureIo> Drop for Pipeline<B, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wait until one of `fds` is readable or `timeout_ms` passes
fn wait_readable(fds: &[BorrowedFd<'_>], timeout_ms: u32) -> io::Result<()> {
    if fds.is_empty() {
        return Ok(());
    }

    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|fd| libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: `pollfds` is a valid array of `len` entries for the call.
    let ret = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms.min(i32::MAX as u32) as libc::c_int,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(())
}

/// Pipeline statistics
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub state: PipelineState,
    /// Loop iterations run
    pub iterations: u64,
    /// Frames attached to the surface
    pub frames_presented: u64,
    /// Filled buffers requeued without display
    pub frames_dropped: u64,
    /// Import requests the compositor refused
    pub imports_failed: u64,
    pub elapsed_seconds: f64,
}

impl PipelineStats {
    pub fn fps(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.frames_presented as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline {:?}: {} frames presented ({:.1} fps), {} dropped, {} imports failed, {} iterations in {:.1}s",
            self.state,
            self.frames_presented,
            self.fps(),
            self.frames_dropped,
            self.imports_failed,
            self.iterations,
            self.elapsed_seconds
        )
    }
}
