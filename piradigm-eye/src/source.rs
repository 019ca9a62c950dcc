//! Capture thread feeding the frame slot

use crate::camera::Camera;
use crate::error::VisionError;
use crate::frame::Frame;
use crate::handoff::{FrameSlot, Publish};
use image::RgbImage;
use piradigm_core::{CancelToken, StopReason};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Owns the camera while capture runs.
///
/// The camera is opened before the thread starts, so an initialisation
/// failure surfaces from [`FrameSource::start`] and nothing keeps running.
/// The thread hands the camera back from [`FrameSource::stop`] once joined.
pub struct FrameSource {
    handle: Option<JoinHandle<Box<dyn Camera>>>,
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
}

impl FrameSource {
    pub fn start(
        mut camera: Box<dyn Camera>,
        slot: Arc<FrameSlot>,
        cancel: CancelToken,
        max_failures: u32,
    ) -> Result<Self, VisionError> {
        camera.open()?;
        let (width, height) = camera.resolution();
        info!(camera = camera.name(), width, height, "Frame source starting");

        let stop = Arc::new(AtomicBool::new(false));
        let captured = Arc::new(AtomicU64::new(0));

        let worker = CaptureLoop {
            slot,
            cancel,
            stop: stop.clone(),
            captured: captured.clone(),
            max_failures: max_failures.max(1),
            resolution: (width, height),
        };

        // the closure owns the camera, so a failed spawn drops (and closes) it
        let handle = thread::Builder::new()
            .name("piradigm-capture".to_string())
            .spawn(move || worker.run(camera))
            .map_err(VisionError::Io)?;

        Ok(Self {
            handle: Some(handle),
            stop,
            captured,
        })
    }

    /// Frames captured so far
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request termination, join the capture thread and return the camera,
    /// still open, for the caller to release.
    pub fn stop(mut self) -> Result<Box<dyn Camera>, VisionError> {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| VisionError::Camera("Frame source already stopped".to_string()))?;
        handle
            .join()
            .map_err(|_| VisionError::Camera("Capture thread panicked".to_string()))
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Release);
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

struct CaptureLoop {
    slot: Arc<FrameSlot>,
    cancel: CancelToken,
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
    max_failures: u32,
    resolution: (u32, u32),
}

impl CaptureLoop {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    fn run(self, mut camera: Box<dyn Camera>) -> Box<dyn Camera> {
        let format = camera.pixel_format();
        let mut spare: Option<RgbImage> = None;
        let mut failures = 0u32;
        let mut sequence = 0u64;

        while !self.should_stop() {
            let mut buffer = spare
                .take()
                .or_else(|| self.slot.reclaim_buffer())
                .unwrap_or_else(|| RgbImage::new(self.resolution.0, self.resolution.1));

            match camera.read_into(&mut buffer) {
                Ok(()) => {
                    failures = 0;
                    sequence += 1;
                    self.captured.fetch_add(1, Ordering::Relaxed);
                    if self.slot.publish(Frame::new(buffer, format, sequence)) == Publish::Overwrote {
                        trace!(sequence, "Dropped unprocessed frame");
                    }
                }
                Err(e) => {
                    spare = Some(buffer);
                    failures += 1;
                    warn!(failures, "Camera read error: {}", e);
                    if failures >= self.max_failures {
                        error!("Too many camera read errors ({}), stopping capture", failures);
                        self.cancel.cancel(StopReason::CameraFailed);
                        break;
                    }
                    self.cancel.wait_timeout(READ_RETRY_DELAY);
                }
            }
        }

        debug!(frames = sequence, "Frame source stopped");
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticCamera;
    use std::time::Instant;

    #[test]
    fn test_open_failure_is_returned() {
        let camera = SyntheticCamera::new(8, 8, 30).failing_open();
        let result = FrameSource::start(
            Box::new(camera),
            Arc::new(FrameSlot::new()),
            CancelToken::new(),
            3,
        );
        assert!(matches!(result, Err(VisionError::Camera(_))));
    }

    #[test]
    fn test_frames_arrive_and_camera_is_returned() {
        let camera = SyntheticCamera::solid(8, 6, 200, [1, 2, 3]);
        let monitor = camera.monitor();
        let slot = Arc::new(FrameSlot::new());
        let source = FrameSource::start(Box::new(camera), slot.clone(), CancelToken::new(), 3).unwrap();

        let lease = slot.wait_for_frame(Duration::from_secs(2)).unwrap();
        assert_eq!((lease.width(), lease.height()), (8, 6));
        assert_eq!(lease.rgb_at(0, 0), [1, 2, 3]);
        drop(lease);

        let mut camera = source.stop().unwrap();
        assert!(monitor.is_open());
        camera.close();
        assert!(!monitor.is_open());
    }

    #[test]
    fn test_repeated_read_failures_cancel() {
        let camera = SyntheticCamera::new(4, 4, 500).failing_after(1);
        let cancel = CancelToken::new();
        let source =
            FrameSource::start(Box::new(camera), Arc::new(FrameSlot::new()), cancel.clone(), 3).unwrap();

        let start = Instant::now();
        while !cancel.is_cancelled() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(cancel.reason(), Some(StopReason::CameraFailed));
        assert_eq!(source.captured(), 1);
        assert!(source.stop().is_ok());
    }
}
