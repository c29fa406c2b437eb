//! dmaview CLI
//!
//! Zero-copy V4L2 capture straight into a Wayland window.
//!
//! # Usage
//!
//! ```bash
//! # Show an NV12 webcam
//! dmaview /dev/video0 NV12
//!
//! # Multi-plane device (NV12M)
//! dmaview /dev/video2 NM12 --planes 2
//!
//! # Display-only demo, no device needed
//! dmaview
//!
//! # What can the compositor import?
//! dmaview --list-formats
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use dmaview_core::DmaviewError;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Exit status for usage errors
const EXIT_USAGE: u8 = 1;

/// Exit status for failures without a more specific class
const EXIT_OTHER: u8 = 8;

/// dmaview - zero-copy V4L2 to Wayland viewer
#[derive(Parser, Debug)]
#[command(name = "dmaview")]
#[command(version)]
#[command(about = "Show a V4L2 capture device in a Wayland window without copying frames", long_about = None)]
pub struct Cli {
    /// Capture device node, e.g. /dev/video0 (omit for the demo)
    #[arg(requires = "fourcc")]
    pub device: Option<PathBuf>,

    /// Pixel format to import as, e.g. NV12
    pub fourcc: Option<String>,

    /// Planes per buffer (1 = single-plane API)
    #[arg(long)]
    pub planes: Option<u32>,

    /// Window title
    #[arg(long)]
    pub title: Option<String>,

    /// Initial window width
    #[arg(long)]
    pub width: Option<u32>,

    /// Initial window height
    #[arg(long)]
    pub height: Option<u32>,

    /// Config file (default: ~/.config/dmaview/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the compositor's linear dmabuf formats and exit
    #[arg(long)]
    pub list_formats: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.verbose);

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let dmaview_error = e.downcast_ref::<DmaviewError>();
            if let Some(hint) = dmaview_error.and_then(|err| err.user_hint()) {
                eprintln!("Hint: {}", hint);
            }
            let code = dmaview_error
                .map(|err| err.exit_code() as u8)
                .unwrap_or(EXIT_OTHER);
            ExitCode::from(code)
        }
    }
}

/// Set up logging based on verbosity
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["dmaview", "dmaview_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_and_fourcc() {
        let cli = Cli::try_parse_from(["dmaview", "/dev/video0", "NV12"]).unwrap();
        assert_eq!(cli.device, Some(PathBuf::from("/dev/video0")));
        assert_eq!(cli.fourcc.as_deref(), Some("NV12"));
    }

    #[test]
    fn test_parse_no_arguments_is_demo() {
        let cli = Cli::try_parse_from(["dmaview"]).unwrap();
        assert!(cli.device.is_none());
        assert!(cli.fourcc.is_none());
    }

    #[test]
    fn test_device_without_fourcc_is_usage_error() {
        let err = Cli::try_parse_from(["dmaview", "/dev/video0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_extra_positional_is_usage_error() {
        assert!(Cli::try_parse_from(["dmaview", "/dev/video0", "NV12", "extra"]).is_err());
    }

    #[test]
    fn test_options() {
        let cli = Cli::try_parse_from([
            "dmaview",
            "/dev/video2",
            "NM12",
            "--planes",
            "2",
            "--title",
            "cam",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.planes, Some(2));
        assert_eq!(cli.title.as_deref(), Some("cam"));
        assert_eq!(cli.verbose, 2);
    }
}
