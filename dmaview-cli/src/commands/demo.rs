//! Demo command - animate a solid color without a capture device

use anyhow::Result;
use dmaview_core::config::StreamConfig;
use dmaview_core::display::{ColorCycle, WaylandDisplay};
use dmaview_core::{FrameSource, Pipeline, WindowSurface};
use tracing::info;

/// Open a window and cycle its color until it is closed
pub fn demo(config: &StreamConfig) -> Result<()> {
    info!("Starting {}", config);

    let mut display = WaylandDisplay::connect()?;
    let mut window = WindowSurface::new(config.window.size);
    display.create_window(&config.window.title, config.window.opaque, &mut window)?;

    let mut pipeline: Pipeline<WaylandDisplay> = Pipeline::new(
        display,
        window,
        FrameSource::Demo(ColorCycle::new()),
        config.idle_wait_ms,
    );
    pipeline.run()?;
    pipeline.shutdown();
    Ok(())
}
