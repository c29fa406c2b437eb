//! Mock infrastructure for testing
//!
//! Provides a fake V4L2 device and a fake display backend. Both write to a
//! shared [`CallLog`] so tests can check the order of operations across the
//! capture and display sides.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::rc::Rc;

use dmaview_core::capture::sys::{
    V4L2_CAP_STREAMING, V4L2_CAP_VIDEO_CAPTURE, V4L2_CAP_VIDEO_CAPTURE_MPLANE,
};
use dmaview_core::capture::{ActiveFormat, BufferInfo, CaptureIo, DeviceCapabilities, PlaneInfo};
use dmaview_core::display::{DisplayBackend, DisplayEvent, SurfaceOps, WindowResource};
use dmaview_core::error::{DmaviewError, Result};
use dmaview_core::formats::fourcc;
use dmaview_core::import::{DmabufImporter, ImportParams, RequestId};
use dmaview_core::types::{BufferLayout, FilledFrame, Resolution};

/// Ordered record of calls made on the fakes
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.borrow().iter().any(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Position of the last matching entry
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.borrow().iter().rposition(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// A descriptor that is safe to hand out as an "exported" plane
pub fn dummy_fd() -> OwnedFd {
    File::open("/dev/null")
        .expect("open /dev/null")
        .into()
}

/// Capability bits for a plain single-plane webcam
pub const CAPS_SINGLE_PLANE: u32 = V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING;

/// Capability bits for a multi-plane capture node
pub const CAPS_MULTI_PLANE: u32 = V4L2_CAP_VIDEO_CAPTURE_MPLANE | V4L2_CAP_STREAMING;

/// Mutable state behind [`FakeDevice`]
#[derive(Debug)]
pub struct FakeDeviceState {
    pub capabilities: u32,
    pub format: ActiveFormat,
    /// Most buffers REQBUFS will grant
    pub max_grant: u32,
    /// Make EXPBUF fail for (buffer, plane)
    pub fail_export: Option<(u32, u32)>,
    /// Buffers currently in the device queue
    pub queued: BTreeSet<u32>,
    /// Buffers the "hardware" has filled, in order
    pub ready: VecDeque<u32>,
    pub streaming: bool,
    pub sequence: u32,
}

/// A scripted V4L2 device
#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub state: Rc<RefCell<FakeDeviceState>>,
    /// Always-readable descriptor offered for polling
    wakeup: Option<Rc<OwnedFd>>,
    log: CallLog,
}

impl FakeDevice {
    /// 640x480 NV12 single-plane device
    pub fn single_plane(log: CallLog) -> Self {
        Self::new(
            log,
            CAPS_SINGLE_PLANE,
            ActiveFormat {
                fourcc: fourcc::NV12,
                resolution: Resolution::new(640, 480),
                strides: vec![640],
            },
        )
    }

    /// 1280x720 NV12M two-plane device
    pub fn multi_plane(log: CallLog) -> Self {
        Self::new(
            log,
            CAPS_MULTI_PLANE,
            ActiveFormat {
                fourcc: fourcc::NV12M,
                resolution: Resolution::new(1280, 720),
                strides: vec![1280, 1280],
            },
        )
    }

    pub fn new(log: CallLog, capabilities: u32, format: ActiveFormat) -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeDeviceState {
                capabilities,
                format,
                max_grant: 32,
                fail_export: None,
                queued: BTreeSet::new(),
                ready: VecDeque::new(),
                streaming: false,
                sequence: 0,
            })),
            wakeup: None,
            log,
        }
    }

    /// Offer a pollable descriptor; each lookup is logged as "poll_fd"
    pub fn with_wakeup(mut self) -> Self {
        self.wakeup = Some(Rc::new(dummy_fd()));
        self
    }

    pub fn with_max_grant(self, max_grant: u32) -> Self {
        self.state.borrow_mut().max_grant = max_grant;
        self
    }

    pub fn with_failing_export(self, buffer: u32, plane: u32) -> Self {
        self.state.borrow_mut().fail_export = Some((buffer, plane));
        self
    }

    /// Pretend the hardware filled `index`
    pub fn fill(&self, index: u32) {
        self.state.borrow_mut().ready.push_back(index);
    }

    pub fn queued(&self) -> BTreeSet<u32> {
        self.state.borrow().queued.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.borrow().streaming
    }
}

impl CaptureIo for FakeDevice {
    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        self.log.push("QUERYCAP");
        Ok(DeviceCapabilities {
            driver: "fake".to_string(),
            card: "Fake Camera".to_string(),
            bus_info: "platform:fake".to_string(),
            capabilities: self.state.borrow().capabilities,
        })
    }

    fn get_format(&mut self, _layout: BufferLayout) -> io::Result<ActiveFormat> {
        self.log.push("G_FMT");
        Ok(self.state.borrow().format.clone())
    }

    fn request_buffers(&mut self, _layout: BufferLayout, count: u32) -> io::Result<u32> {
        self.log.push(format!("REQBUFS {}", count));
        let mut state = self.state.borrow_mut();
        if count == 0 {
            state.queued.clear();
            state.ready.clear();
            return Ok(0);
        }
        Ok(count.min(state.max_grant))
    }

    fn query_buffer(&mut self, _layout: BufferLayout, index: u32, planes: u32) -> io::Result<BufferInfo> {
        self.log.push(format!("QUERYBUF {}", index));
        Ok(BufferInfo {
            index,
            planes: (0..planes)
                .map(|p| PlaneInfo {
                    length: 4096 * (p + 1),
                    offset: index * 0x10000 + p * 0x1000,
                })
                .collect(),
        })
    }

    fn queue_buffer(&mut self, _layout: BufferLayout, index: u32, _planes: u32) -> io::Result<()> {
        self.log.push(format!("QBUF {}", index));
        self.state.borrow_mut().queued.insert(index);
        Ok(())
    }

    fn export_plane(&mut self, _layout: BufferLayout, index: u32, plane: u32) -> io::Result<OwnedFd> {
        self.log.push(format!("EXPBUF {}.{}", index, plane));
        if self.state.borrow().fail_export == Some((index, plane)) {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "EXPBUF not supported"));
        }
        Ok(dummy_fd())
    }

    fn stream_on(&mut self, _layout: BufferLayout) -> io::Result<()> {
        self.log.push("STREAMON");
        self.state.borrow_mut().streaming = true;
        Ok(())
    }

    fn stream_off(&mut self, _layout: BufferLayout) -> io::Result<()> {
        self.log.push("STREAMOFF");
        let mut state = self.state.borrow_mut();
        state.streaming = false;
        state.queued.clear();
        Ok(())
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        let fd = self.wakeup.as_ref()?;
        self.log.push("poll_fd");
        Some(fd.as_fd())
    }

    fn dequeue_buffer(&mut self, _layout: BufferLayout, _planes: u32) -> io::Result<Option<FilledFrame>> {
        let mut state = self.state.borrow_mut();
        let Some(&index) = state.ready.front() else {
            return Ok(None);
        };
        if !state.queued.contains(&index) {
            return Ok(None);
        }

        state.ready.pop_front();
        state.queued.remove(&index);
        state.sequence += 1;
        self.log.push(format!("DQBUF {}", index));
        Ok(Some(FilledFrame {
            index,
            sequence: state.sequence,
            bytes_used: 4096,
        }))
    }
}

/// Compositor buffer handed out by [`FakeDisplay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBuffer(pub u64);

/// How the fake compositor answers import requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAnswer {
    Create,
    Fail,
    Ignore,
}

/// Mutable state behind [`FakeDisplay`]
#[derive(Debug)]
pub struct FakeDisplayState {
    pub answer: ImportAnswer,
    /// Events queued by the fake itself (import answers)
    pub pending: VecDeque<DisplayEvent<FakeBuffer>>,
    /// One batch per dispatch call
    pub script: VecDeque<Vec<DisplayEvent<FakeBuffer>>>,
    /// Plane descriptors seen per submitted request
    pub submitted_fds: Vec<Vec<i32>>,
    pub colors: Vec<[u8; 3]>,
    pub dispatches: usize,
    /// Attach calls left to refuse
    pub failing_attaches: usize,
}

/// A scripted compositor
#[derive(Debug, Clone)]
pub struct FakeDisplay {
    pub state: Rc<RefCell<FakeDisplayState>>,
    log: CallLog,
}

impl FakeDisplay {
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeDisplayState {
                answer: ImportAnswer::Create,
                pending: VecDeque::new(),
                script: VecDeque::new(),
                submitted_fds: Vec::new(),
                colors: Vec::new(),
                dispatches: 0,
                failing_attaches: 0,
            })),
            log,
        }
    }

    pub fn answering(self, answer: ImportAnswer) -> Self {
        self.state.borrow_mut().answer = answer;
        self
    }

    /// Refuse the next `count` attach calls
    pub fn fail_attaches(&self, count: usize) {
        self.state.borrow_mut().failing_attaches = count;
    }

    /// Queue a batch for a later dispatch
    pub fn script(&self, batch: Vec<DisplayEvent<FakeBuffer>>) {
        self.state.borrow_mut().script.push_back(batch);
    }
}

impl SurfaceOps for FakeDisplay {
    fn ack_configure(&mut self, serial: u32) {
        self.log.push(format!("ack {}", serial));
    }

    fn resize(&mut self, size: Resolution) {
        self.log.push(format!("resize {}", size));
    }

    fn commit(&mut self) {
        self.log.push("commit");
    }

    fn release(&mut self, resource: WindowResource) {
        self.log.push(format!("release {:?}", resource));
    }
}

impl DmabufImporter for FakeDisplay {
    type Buffer = FakeBuffer;

    fn submit(&mut self, id: RequestId, params: &ImportParams) -> Result<()> {
        use std::os::fd::AsRawFd;

        self.log.push(format!("submit {}", params.buffer));
        let mut state = self.state.borrow_mut();
        state.submitted_fds.push(
            params
                .planes
                .iter()
                .map(|p| p.handle.as_fd().as_raw_fd())
                .collect(),
        );

        match state.answer {
            ImportAnswer::Create => state.pending.push_back(DisplayEvent::ImportCreated {
                request: id,
                buffer: FakeBuffer(id.raw()),
            }),
            ImportAnswer::Fail => state
                .pending
                .push_back(DisplayEvent::ImportFailed { request: id }),
            ImportAnswer::Ignore => {}
        }
        Ok(())
    }
}

impl DisplayBackend for FakeDisplay {
    fn dispatch_pending(&mut self) -> Result<Vec<DisplayEvent<FakeBuffer>>> {
        let mut state = self.state.borrow_mut();
        state.dispatches += 1;

        let mut events: Vec<_> = state.pending.drain(..).collect();
        if let Some(batch) = state.script.pop_front() {
            events.extend(batch);
        }
        Ok(events)
    }

    fn attach(&mut self, buffer: &FakeBuffer, size: Resolution) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_attaches > 0 {
            state.failing_attaches -= 1;
            self.log.push(format!("attach refused {}", buffer.0));
            return Err(DmaviewError::display("wl_surface.attach refused"));
        }
        self.log.push(format!("attach {} {}", buffer.0, size));
        Ok(())
    }

    fn present_color(&mut self, rgb: [u8; 3], _size: Resolution) -> Result<bool> {
        self.state.borrow_mut().colors.push(rgb);
        Ok(true)
    }

    fn destroy_buffer(&mut self, buffer: FakeBuffer) {
        self.log.push(format!("destroy_buffer {}", buffer.0));
    }

    fn disconnect(&mut self) {
        self.log.push("disconnect");
    }
}
