//! Camera devices
//!
//! A [`Camera`] is opened once by the challenge, handed to the capture thread
//! for the lifetime of the run and released after that thread has been
//! joined.

mod synthetic;

#[cfg(feature = "opencv")]
mod hardware;

pub use synthetic::{CameraMonitor, SyntheticCamera};

#[cfg(feature = "opencv")]
pub use hardware::OpenCvCamera;

use crate::error::VisionError;
use crate::frame::PixelFormat;
use image::RgbImage;

/// Frame-producing device
pub trait Camera: Send {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Acquire the device and apply the capture profile.
    /// Failure here is fatal to the challenge and must not be retried.
    fn open(&mut self) -> Result<(), VisionError>;

    /// Capture resolution (width, height); read once at start-up
    fn resolution(&self) -> (u32, u32);

    /// Channel order of the buffers written by [`Camera::read_into`]
    fn pixel_format(&self) -> PixelFormat;

    /// Block until the next frame is available and write it into `buffer`,
    /// resizing the buffer when its dimensions differ.
    fn read_into(&mut self, buffer: &mut RgbImage) -> Result<(), VisionError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}
