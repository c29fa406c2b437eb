//! CLI command implementations

mod demo;
mod formats;
mod stream;

pub use demo::demo;
pub use formats::list_formats;
pub use stream::stream;

use anyhow::Result;
use dmaview_core::config::{ConfigFile, StreamConfig};
use dmaview_core::formats::parse_fourcc;

use crate::Cli;

/// Dispatch to the right command
pub fn run(cli: Cli) -> Result<()> {
    if cli.list_formats {
        return list_formats();
    }

    let config = resolve_config(&cli)?;
    if config.is_capture() {
        stream(&config)
    } else {
        demo(&config)
    }
}

/// Config file values with command-line overrides on top
fn resolve_config(cli: &Cli) -> Result<StreamConfig> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load_from(path.clone())?,
        None => ConfigFile::load_or_default(),
    };
    let mut config = file.to_stream_config()?;

    if let (Some(device), Some(fourcc)) = (&cli.device, &cli.fourcc) {
        config = config.with_device(device.clone(), parse_fourcc(fourcc)?);
    }
    if let Some(planes) = cli.planes {
        config = config.with_planes(planes);
    }
    if let Some(title) = &cli.title {
        config = config.with_title(title.clone());
    }
    config = config.with_size(cli.width, cli.height);

    config.validate()?;
    Ok(config)
}
