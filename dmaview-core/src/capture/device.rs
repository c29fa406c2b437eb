//! Capture device: buffer allocation, export and streaming

use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::pool::{BufferPool, BufferState};
use super::v4l2::V4l2Device;
use super::{ActiveFormat, CaptureIo, DeviceCapabilities};
use crate::error::{DmaviewError, Result};
use crate::formats::fourcc_to_string;
use crate::types::{
    BufferLayout, ExportedBuffer, ExportedPlane, FilledFrame, MAX_PLANES, POOL_SIZE, Resolution,
};

/// A V4L2 capture device with an exported buffer pool
///
/// Generic over the ioctl layer so tests can substitute a fake.
pub struct CaptureDevice<D: CaptureIo = V4l2Device> {
    io: D,
    path: PathBuf,
    capabilities: DeviceCapabilities,
    format: ActiveFormat,
    requested_format: u32,
    layout: BufferLayout,
    plane_count: u32,
    pool: BufferPool,
    /// Buffers the device currently holds for us (0 when released)
    granted: u32,
    streaming: bool,
    closed: bool,
}

impl CaptureDevice<V4l2Device> {
    /// Open a device node and validate it for streaming capture
    ///
    /// # Arguments
    /// * `path` - Device node, e.g. `/dev/video0`
    /// * `desired_format` - Fourcc the operator asked for
    /// * `plane_count` - 1 for the single-plane API, more for multi-plane
    pub fn open(path: impl AsRef<Path>, desired_format: u32, plane_count: u32) -> Result<Self> {
        let io = V4l2Device::open(path.as_ref())?;
        Self::with_io(io, path.as_ref(), desired_format, plane_count)
    }
}

impl<D: CaptureIo> CaptureDevice<D> {
    /// Wrap an already-open device
    pub fn with_io(
        mut io: D,
        path: impl Into<PathBuf>,
        desired_format: u32,
        plane_count: u32,
    ) -> Result<Self> {
        let path = path.into();

        if plane_count == 0 || plane_count as usize > MAX_PLANES {
            return Err(DmaviewError::config(format!(
                "plane count must be between 1 and {}, got {}",
                MAX_PLANES, plane_count
            )));
        }

        let capabilities = io
            .query_capabilities()
            .map_err(|e| DmaviewError::ioctl("VIDIOC_QUERYCAP", e))?;
        info!(
            "Video device {:?}: {} ({}), multi-plane capture: {}",
            path,
            capabilities.card,
            capabilities.driver,
            capabilities.can_capture_mplane()
        );

        if !capabilities.can_stream() {
            return Err(DmaviewError::UnsupportedDevice {
                path,
                reason: "no streaming I/O support".to_string(),
            });
        }

        let layout = BufferLayout::for_planes(plane_count);
        let supported = match layout {
            BufferLayout::SinglePlanar => capabilities.can_capture(),
            BufferLayout::MultiPlanar => capabilities.can_capture_mplane(),
        };
        if !supported {
            return Err(DmaviewError::UnsupportedDevice {
                path,
                reason: format!("no {} capture support", layout),
            });
        }

        let format = io
            .get_format(layout)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_G_FMT", e))?;
        info!(
            "Current format {} at {}, stride {}",
            fourcc_to_string(format.fourcc),
            format.resolution,
            format.stride()
        );

        if format.fourcc != desired_format {
            warn!(
                "Device is set to {} but {} was requested; importing as {}",
                fourcc_to_string(format.fourcc),
                fourcc_to_string(desired_format),
                fourcc_to_string(desired_format)
            );
        }

        if layout == BufferLayout::MultiPlanar && format.strides.len() != plane_count as usize {
            warn!(
                "Driver describes {} planes, using {}",
                format.strides.len(),
                plane_count
            );
        }

        Ok(Self {
            io,
            path,
            capabilities,
            format,
            requested_format: desired_format,
            layout,
            plane_count,
            pool: BufferPool::new(),
            granted: 0,
            streaming: false,
            closed: false,
        })
    }

    /// Request, queue and export `count` buffers
    ///
    /// Asks the device for `count * plane_count` buffers. On success every
    /// buffer is queued and each of its planes has an exported handle; the
    /// returned values carry those handles.
    ///
    /// On failure no handles survive and the device's buffers are released.
    pub fn allocate_buffers(&mut self, count: u32) -> Result<Vec<ExportedBuffer>> {
        if count == 0 || count as usize > POOL_SIZE {
            return Err(DmaviewError::config(format!(
                "buffer count must be between 1 and {}, got {}",
                POOL_SIZE, count
            )));
        }

        let requested = count * self.plane_count;
        let granted = self
            .io
            .request_buffers(self.layout, requested)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_REQBUFS", e))?;
        self.granted = granted;

        if granted < requested {
            self.release_buffers();
            return Err(DmaviewError::InsufficientBuffers { requested, granted });
        }
        info!("Device granted {} buffers", granted);

        self.pool.reset(count as usize)?;

        let mut exported = Vec::with_capacity(count as usize);
        for index in 0..count {
            match self.setup_buffer(index) {
                Ok(buffer) => exported.push(buffer),
                Err(e) => {
                    // Close every handle before the device drops its buffers
                    drop(exported);
                    self.pool.clear();
                    self.release_buffers();
                    return Err(e);
                }
            }
        }

        Ok(exported)
    }

    fn setup_buffer(&mut self, index: u32) -> Result<ExportedBuffer> {
        let info = self
            .io
            .query_buffer(self.layout, index, self.plane_count)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_QUERYBUF", e))?;
        for (plane, p) in info.planes.iter().enumerate() {
            debug!(
                "Buffer {} plane {}: length {} offset {:#010x}",
                index, plane, p.length, p.offset
            );
        }
        let lengths: Vec<u32> = info.planes.iter().map(|p| p.length).collect();
        self.pool.set_planes(index, info.planes)?;

        self.io
            .queue_buffer(self.layout, index, self.plane_count)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_QBUF", e))?;
        self.pool.transition(index, BufferState::Queued)?;

        let mut planes = Vec::with_capacity(self.plane_count as usize);
        for plane in 0..self.plane_count {
            let fd = self
                .io
                .export_plane(self.layout, index, plane)
                .map_err(|source| DmaviewError::ExportFailed {
                    buffer: index,
                    plane,
                    source,
                })?;
            debug!("Buffer {} plane {} exported as fd {}", index, plane, fd.as_raw_fd());

            let length = lengths.get(plane as usize).copied().unwrap_or(0);
            planes.push(ExportedPlane::new(plane, length, fd));
        }
        self.pool.transition(index, BufferState::Exported)?;

        Ok(ExportedBuffer { index, planes })
    }

    /// Start the capture stream
    ///
    /// Buffers handed back by an earlier `stop_streaming` are queued again
    /// first.
    pub fn start_streaming(&mut self) -> Result<()> {
        if self.streaming {
            return Ok(());
        }

        for index in self.indices_in(BufferState::Dequeued) {
            self.io
                .queue_buffer(self.layout, index, self.plane_count)
                .map_err(|e| DmaviewError::ioctl("VIDIOC_QBUF", e))?;
            self.pool.transition(index, BufferState::Exported)?;
        }

        self.io
            .stream_on(self.layout)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_STREAMON", e))?;
        self.streaming = true;
        info!("Streaming started on {:?}", self.path);
        Ok(())
    }

    /// Stop the capture stream
    ///
    /// STREAMOFF hands every queued buffer back, so those become `Dequeued`.
    /// Filled and displayed buffers keep their state; all of them can be
    /// requeued, and `start_streaming` requeues the dequeued ones.
    pub fn stop_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.io
            .stream_off(self.layout)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_STREAMOFF", e))?;

        for index in self.indices_in(BufferState::Exported) {
            self.pool.transition(index, BufferState::Dequeued)?;
        }
        info!("Streaming stopped on {:?}", self.path);
        Ok(())
    }

    fn indices_in(&self, state: BufferState) -> Vec<u32> {
        self.pool
            .iter()
            .filter(|b| b.state() == state)
            .map(|b| b.index())
            .collect()
    }

    /// Buffers currently waiting in the device queue
    pub fn queued_count(&self) -> usize {
        self.pool.count_in(BufferState::Exported)
    }

    /// Take the next filled buffer, if the device has one ready
    pub fn dequeue_filled(&mut self) -> Result<Option<FilledFrame>> {
        if !self.streaming {
            return Ok(None);
        }

        let frame = self
            .io
            .dequeue_buffer(self.layout, self.plane_count)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_DQBUF", e))?;
        if let Some(frame) = frame {
            self.pool.transition(frame.index, BufferState::Filled)?;
        }
        Ok(frame)
    }

    /// Mark a filled buffer as attached to the surface
    pub fn mark_displayed(&mut self, index: u32) -> Result<()> {
        self.pool.transition(index, BufferState::Displayed)
    }

    /// Hand a filled or displayed buffer back to the device
    pub fn requeue(&mut self, index: u32) -> Result<()> {
        // Validate before touching the device
        let state = self.buffer_state(index).ok_or_else(|| {
            DmaviewError::config(format!("buffer index {} outside pool", index))
        })?;
        if !state.can_become(BufferState::Exported) {
            return Err(DmaviewError::InvalidTransition {
                index,
                from: state.as_str(),
                to: BufferState::Exported.as_str(),
            });
        }

        self.io
            .queue_buffer(self.layout, index, self.plane_count)
            .map_err(|e| DmaviewError::ioctl("VIDIOC_QBUF", e))?;
        self.pool.transition(index, BufferState::Exported)
    }

    /// Stop streaming and give every buffer back to the driver
    ///
    /// Safe to call more than once; dropping the device calls it too.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.stop_streaming() {
            warn!("Failed to stop streaming: {}", e);
        }
        self.pool.clear();
        self.release_buffers();
        debug!("Closed capture device {:?}", self.path);
    }

    fn release_buffers(&mut self) {
        if self.granted == 0 {
            return;
        }
        match self.io.request_buffers(self.layout, 0) {
            Ok(_) => debug!("Released {} device buffers", self.granted),
            Err(e) => warn!("Failed to release device buffers: {}", e),
        }
        self.granted = 0;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Format reported by the device
    pub fn active_format(&self) -> &ActiveFormat {
        &self.format
    }

    /// Fourcc the operator asked for; used for import
    pub fn requested_format(&self) -> u32 {
        self.requested_format
    }

    pub fn resolution(&self) -> Resolution {
        self.format.resolution
    }

    /// Plane 0 stride, used for every imported plane
    pub fn stride(&self) -> u32 {
        self.format.stride()
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn plane_count(&self) -> u32 {
        self.plane_count
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn buffer_state(&self, index: u32) -> Option<BufferState> {
        self.pool.get(index).map(|b| b.state())
    }

    /// Descriptor that becomes readable when a frame is ready
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        self.io.poll_fd()
    }
}

impl<D: CaptureIo> Drop for CaptureDevice<D> {
    fn drop(&mut self) {
        self.close();
    }
}
