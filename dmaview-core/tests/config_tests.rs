//! Integration tests for configuration loading and validation

use dmaview_core::config::{ConfigFile, StreamConfig, sample_config};
use dmaview_core::formats::fourcc;
use dmaview_core::types::Resolution;
use dmaview_core::DmaviewError;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ConfigFile::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, ConfigFile::default());

    let stream = config.to_stream_config().unwrap();
    assert!(!stream.is_capture());
    assert_eq!(stream, StreamConfig::default());
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = ConfigFile::default();
    config.capture.device = Some("/dev/video2".to_string());
    config.capture.format = Some("NM12".to_string());
    config.capture.planes = 2;
    config.window.title = "bench camera".to_string();
    config.display.idle_wait_ms = 0;

    config.save_to(path.clone()).unwrap();
    let loaded = ConfigFile::load_from(path).unwrap();
    assert_eq!(loaded, config);

    let stream = loaded.to_stream_config().unwrap();
    let device = stream.device.as_ref().unwrap();
    assert_eq!(device.path, PathBuf::from("/dev/video2"));
    assert_eq!(device.fourcc, fourcc::NV12M);
    assert_eq!(stream.planes, 2);
    assert_eq!(stream.window.title, "bench camera");
    assert_eq!(stream.idle_wait_ms, 0);
    assert!(stream.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[window]\nwidth = 640\n").unwrap();

    let stream = ConfigFile::load_from(path)
        .unwrap()
        .to_stream_config()
        .unwrap();
    assert_eq!(stream.window.size, Resolution::new(640, 720));
    assert!(stream.window.opaque);
    assert_eq!(stream.idle_wait_ms, 4);
}

#[test]
fn test_device_without_format_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[capture]\ndevice = \"/dev/video0\"\n").unwrap();

    let stream = ConfigFile::load_from(path)
        .unwrap()
        .to_stream_config()
        .unwrap();
    assert!(!stream.is_capture());
}

#[test]
fn test_bad_fourcc_in_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[capture]\ndevice = \"/dev/video0\"\nformat = \"TOOLONG\"\n",
    )
    .unwrap();

    let err = ConfigFile::load_from(path)
        .unwrap()
        .to_stream_config()
        .unwrap_err();
    assert!(matches!(err, DmaviewError::InvalidFormat(_)));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[window\ntitle = ").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(matches!(err, DmaviewError::Config(_)));
    assert_eq!(err.exit_code(), 8);
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_sample_config_matches_defaults() {
    let parsed: ConfigFile = toml::from_str(&sample_config()).unwrap();
    assert_eq!(parsed, ConfigFile::default());
}

#[test]
fn test_cli_overrides() {
    let config = StreamConfig::default()
        .with_device("/dev/video4", fourcc::YUYV)
        .with_planes(1)
        .with_title("override")
        .with_size(Some(1920), None);

    assert!(config.is_capture());
    assert_eq!(config.window.size, Resolution::new(1920, 720));
    assert_eq!(config.window.title, "override");
    assert!(config.to_string().contains("/dev/video4"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_bounds() {
    assert!(StreamConfig::default().with_planes(0).validate().is_err());
    assert!(StreamConfig::default().with_planes(9).validate().is_err());
    assert!(StreamConfig::default().with_planes(8).validate().is_ok());
    assert!(
        StreamConfig::default()
            .with_size(Some(0), None)
            .validate()
            .is_err()
    );

    let mut config = StreamConfig::default();
    config.buffers = 5;
    assert!(matches!(config.validate(), Err(DmaviewError::Config(_))));
}
