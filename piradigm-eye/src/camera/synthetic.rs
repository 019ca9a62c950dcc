//! Generated frames at a fixed rate, for tests and bench runs without hardware

use super::Camera;
use crate::error::VisionError;
use crate::frame::PixelFormat;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fills a buffer for the given frame number
pub type FramePainter = Box<dyn FnMut(u64, &mut RgbImage) + Send>;

/// Observer of a [`SyntheticCamera`]'s device lifecycle
#[derive(Clone, Default)]
pub struct CameraMonitor {
    inner: Arc<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    open: AtomicBool,
    opens: AtomicU32,
    closes: AtomicU32,
    frames: AtomicU64,
}

impl CameraMonitor {
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> u32 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> u64 {
        self.inner.frames.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCamera {
    name: String,
    resolution: (u32, u32),
    frame_interval: Duration,
    painter: FramePainter,
    fail_open: bool,
    fail_after: Option<u64>,
    next_frame_at: Option<Instant>,
    sequence: u64,
    open: bool,
    monitor: CameraMonitor,
}

impl SyntheticCamera {
    /// Black frames at `frame_rate` frames per second
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            name: format!("synthetic {}x{}@{}", width, height, frame_rate),
            resolution: (width, height),
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate as f64),
            painter: Box::new(|_, _| {}),
            fail_open: false,
            fail_after: None,
            next_frame_at: None,
            sequence: 0,
            open: false,
            monitor: CameraMonitor::default(),
        }
    }

    /// Every frame filled with one RGB colour
    pub fn solid(width: u32, height: u32, frame_rate: u32, rgb: [u8; 3]) -> Self {
        Self::new(width, height, frame_rate).with_painter(move |_, buffer| {
            for px in buffer.pixels_mut() {
                *px = Rgb(rgb);
            }
        })
    }

    pub fn with_painter(mut self, painter: impl FnMut(u64, &mut RgbImage) + Send + 'static) -> Self {
        self.painter = Box::new(painter);
        self
    }

    /// Refuse to open, as a missing device would
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Deliver `frames` frames, then fail every read
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn monitor(&self) -> CameraMonitor {
        self.monitor.clone()
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_frame_at {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let base = self.next_frame_at.map_or(now, |due| due.max(now));
        self.next_frame_at = Some(base + self.frame_interval);
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), VisionError> {
        if self.fail_open {
            return Err(VisionError::Camera(format!("{} failed to open", self.name)));
        }
        self.open = true;
        self.monitor.inner.open.store(true, Ordering::SeqCst);
        self.monitor.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb
    }

    fn read_into(&mut self, buffer: &mut RgbImage) -> Result<(), VisionError> {
        if !self.open {
            return Err(VisionError::Camera("Camera not opened".to_string()));
        }

        self.pace();

        if self.fail_after.is_some_and(|limit| self.sequence >= limit) {
            return Err(VisionError::Camera("synthetic read failure".to_string()));
        }

        let (width, height) = self.resolution;
        if buffer.dimensions() != (width, height) {
            *buffer = RgbImage::new(width, height);
        }
        (self.painter)(self.sequence, buffer);
        self.sequence += 1;
        self.monitor.inner.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.monitor.inner.open.store(false, Ordering::SeqCst);
            self.monitor.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.close();
    }
}
