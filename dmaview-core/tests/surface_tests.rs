//! Integration tests for the window configure/resize/close handshake

mod mocks;

use dmaview_core::WindowSurface;
use dmaview_core::display::{SurfacePhase, WindowResource};
use dmaview_core::types::Resolution;
use mocks::{CallLog, FakeDisplay};

fn window(log: &CallLog) -> (WindowSurface, FakeDisplay) {
    let mut window = WindowSurface::new(Resolution::new(1280, 720));
    window.record_created(WindowResource::Surface);
    window.record_created(WindowResource::XdgSurface);
    window.record_created(WindowResource::Toplevel);
    (window, FakeDisplay::new(log.clone()))
}

#[test]
fn test_first_configure_without_size() {
    let log = CallLog::new();
    let (mut window, mut ops) = window(&log);
    assert!(!window.can_present());

    window.on_toplevel_configure(0, 0);
    window.on_configure(1, &mut ops);

    assert_eq!(window.phase(), SurfacePhase::Configured);
    assert_eq!(window.size(), Resolution::new(1280, 720));
    assert_eq!(window.resize_count(), 0);
    assert_eq!(window.last_serial(), Some(1));
    assert!(window.can_present());
    assert_eq!(log.entries(), vec!["ack 1"]);
}

#[test]
fn test_unchanged_size_does_not_resize() {
    let log = CallLog::new();
    let mut window = WindowSurface::new(Resolution::new(800, 600));
    let mut ops = FakeDisplay::new(log.clone());

    window.on_toplevel_configure(800, 600);
    window.on_configure(1, &mut ops);
    window.on_toplevel_configure(800, 600);
    window.on_configure(2, &mut ops);
    assert_eq!(window.resize_count(), 0);

    window.on_toplevel_configure(1024, 768);
    assert_eq!(window.phase(), SurfacePhase::Resized);
    assert_eq!(window.pending_size(), Some(Resolution::new(1024, 768)));
    window.on_configure(3, &mut ops);

    assert_eq!(window.resize_count(), 1);
    assert_eq!(window.size(), Resolution::new(1024, 768));
    assert_eq!(window.phase(), SurfacePhase::Configured);
    assert_eq!(log.count("resize 1024x768"), 1);
    assert!(!log.contains("resize 800x600"));
}

#[test]
fn test_one_zero_dimension_keeps_the_other() {
    let log = CallLog::new();
    let (mut window, mut ops) = window(&log);

    window.on_toplevel_configure(0, 900);
    window.on_configure(1, &mut ops);
    assert_eq!(window.size(), Resolution::new(1280, 900));
    assert_eq!(window.resize_count(), 1);
}

#[test]
fn test_ack_precedes_resize() {
    let log = CallLog::new();
    let (mut window, mut ops) = window(&log);

    window.on_toplevel_configure(1024, 768);
    window.on_configure(42, &mut ops);

    assert_eq!(log.entries(), vec!["ack 42", "resize 1024x768", "commit"]);
}

#[test]
fn test_burst_of_proposals_coalesces() {
    let log = CallLog::new();
    let (mut window, mut ops) = window(&log);
    window.on_configure(1, &mut ops);

    window.on_toplevel_configure(640, 480);
    window.on_toplevel_configure(1920, 1080);
    window.on_toplevel_configure(1000, 1000);
    window.on_configure(2, &mut ops);

    assert_eq!(window.resize_count(), 1);
    assert_eq!(window.size(), Resolution::new(1000, 1000));
    assert!(!log.contains("resize 640x480"));
}

#[test]
fn test_close_then_destroy_in_reverse_order() {
    let log = CallLog::new();
    let (mut window, mut ops) = window(&log);
    window.on_configure(1, &mut ops);

    window.on_close();
    assert!(window.is_closing());
    assert!(!window.can_present());

    // Proposals after close are ignored
    window.on_toplevel_configure(300, 300);
    assert_eq!(window.pending_size(), None);

    log.clear();
    window.destroy(&mut ops);
    window.destroy(&mut ops);
    assert_eq!(
        log.entries(),
        vec!["release Toplevel", "release XdgSurface", "release Surface"]
    );
    assert_eq!(window.phase(), SurfacePhase::Destroyed);
}
