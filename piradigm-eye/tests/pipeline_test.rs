//! Capture thread and hand-off slot working together

use piradigm_core::{CancelToken, StopReason};
use piradigm_eye::{Camera, FrameSlot, FrameSource, SyntheticCamera};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_slow_consumer_never_backs_up() {
    let camera = SyntheticCamera::new(16, 12, 200)
        .with_painter(|seq, buffer| buffer.fill((seq % 251) as u8));
    let slot = Arc::new(FrameSlot::new());
    let source = FrameSource::start(Box::new(camera), slot.clone(), CancelToken::new(), 5).unwrap();

    let mut seen = Vec::new();
    for _ in 0..5 {
        let lease = slot.wait_for_frame(Duration::from_secs(2)).unwrap();
        seen.push(lease.sequence());
        // processing takes several capture periods
        thread::sleep(Duration::from_millis(30));
        assert!(slot.pending_len() <= 1);
        drop(lease);
    }

    let camera = source.stop().unwrap();
    drop(camera);

    // sequences only move forward, skipping frames that were overwritten
    assert!(seen.windows(2).all(|w| w[1] > w[0]));
    assert!(seen.windows(2).any(|w| w[1] - w[0] > 1));

    let stats = slot.stats();
    assert!(stats.overwritten > 0);
    assert_eq!(stats.consumed, 5);
}

#[test]
fn test_cancel_stops_capture() {
    let camera = SyntheticCamera::new(8, 8, 100);
    let monitor = camera.monitor();
    let cancel = CancelToken::new();
    let source = FrameSource::start(Box::new(camera), Arc::new(FrameSlot::new()), cancel.clone(), 5).unwrap();

    thread::sleep(Duration::from_millis(30));
    cancel.cancel(StopReason::Stopped);

    let start = Instant::now();
    while source.is_running() && start.elapsed() < Duration::from_secs(1) {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!source.is_running());

    let mut camera = source.stop().unwrap();
    camera.close();
    assert!(!monitor.is_open());
    assert!(monitor.frames_read() >= 1);
}
