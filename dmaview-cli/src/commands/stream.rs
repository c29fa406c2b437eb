//! Stream command - show a capture device in a window

use anyhow::{Context, Result, bail};
use dmaview_core::config::StreamConfig;
use dmaview_core::display::WaylandDisplay;
use dmaview_core::formats::fourcc_to_string;
use dmaview_core::{CaptureDevice, DmaviewError, FrameSource, Pipeline, WindowSurface};
use tracing::info;

/// Capture from the configured device until the window closes
pub fn stream(config: &StreamConfig) -> Result<()> {
    let Some(device) = &config.device else {
        bail!("no capture device configured");
    };
    info!("Starting {}", config);

    // Device first, so a bad node fails before any window appears
    let mut capture = CaptureDevice::open(&device.path, device.fourcc, config.planes)?;
    let exported = capture.allocate_buffers(config.buffers)?;

    let mut display = WaylandDisplay::connect()?;
    if !display.supports_dmabuf() {
        return Err(DmaviewError::DisplayConnectionFailed(
            "compositor does not offer zwp_linux_dmabuf_v1".to_string(),
        )
        .into());
    }

    let mut window = WindowSurface::new(config.window.size);
    display.create_window(&config.window.title, config.window.opaque, &mut window)?;

    println!(
        "Showing {} ({} {}) - close the window to stop",
        device.path.display(),
        fourcc_to_string(device.fourcc),
        capture.resolution()
    );

    let mut pipeline = Pipeline::new(
        display,
        window,
        FrameSource::Capture(capture),
        config.idle_wait_ms,
    );
    pipeline
        .import_buffers(exported)
        .context("Failed to submit dmabuf imports")?;
    pipeline.run()?;

    let stats = pipeline.stats();
    pipeline.shutdown();
    println!("{}", stats);
    Ok(())
}
