//! Formats command - list what the compositor can import

use anyhow::Result;
use dmaview_core::DmaviewError;
use dmaview_core::display::WaylandDisplay;
use dmaview_core::formats::fourcc_to_string;

/// Print every format the compositor accepts with a linear modifier
pub fn list_formats() -> Result<()> {
    let mut display = WaylandDisplay::connect()?;
    if !display.supports_dmabuf() {
        return Err(DmaviewError::DisplayConnectionFailed(
            "compositor does not offer zwp_linux_dmabuf_v1".to_string(),
        )
        .into());
    }

    let table = display.collect_formats()?;
    let linear = table.linear_formats();

    println!("Linear dmabuf formats ({} of {} advertised):", linear.len(), table.len());
    for format in &linear {
        println!("  {}  {:#010x}", fourcc_to_string(*format), format);
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        println!();
        println!("All format/modifier pairs:");
        for line in table.describe() {
            println!("  {}", line);
        }
    }

    Ok(())
}
