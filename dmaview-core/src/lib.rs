//! dmaview Core Library
//!
//! Zero-copy video from V4L2 capture devices to a Wayland window.
//!
//! This library provides:
//! - V4L2 MMAP buffer allocation with per-plane DMA-BUF export
//! - `zwp_linux_dmabuf_v1` import of those buffers into the compositor
//! - An xdg-shell window with configure/resize/close handling
//! - A single-threaded event loop tying the two together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ V4L2 Capture    │───▶│ Import Bridge│───▶│ Wayland Surface │
//! │ (EXPBUF fds)    │    │ (dmabuf v3)  │    │ (xdg_toplevel)  │
//! └─────────────────┘    └──────────────┘    └─────────────────┘
//! ```
//!
//! Pixel data never passes through this process: the device writes into
//! its buffers, and the compositor samples them through the exported
//! handles.

pub mod capture;
pub mod config;
pub mod display;
pub mod error;
pub mod formats;
pub mod import;
pub mod pipeline;
pub mod types;

pub use capture::CaptureDevice;
pub use config::{ConfigFile, StreamConfig};
pub use display::{WaylandDisplay, WindowSurface};
pub use error::{DmaviewError, Result};
pub use import::ImportBridge;
pub use pipeline::{FrameSource, Pipeline};
pub use types::{BufferLayout, ExportedBuffer, ExportedPlane, Resolution};
