//! V4L/Pi camera capture through OpenCV

use super::Camera;
use crate::error::VisionError;
use crate::frame::PixelFormat;
use image::RgbImage;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_AUTO_WB, CAP_PROP_EXPOSURE, CAP_PROP_FPS,
        CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, CAP_PROP_ISO_SPEED,
    },
};
use piradigm_core::CameraConfig;
use tracing::{debug, info, warn};

pub struct OpenCvCamera {
    config: CameraConfig,
    name: String,
    capture: Option<VideoCapture>,
    resolution: (u32, u32),
    mat: Mat,
}

impl OpenCvCamera {
    pub fn new(config: CameraConfig) -> Self {
        let name = format!("opencv camera {}", config.device_id);
        let resolution = config.resolution;
        Self {
            config,
            name,
            capture: None,
            resolution,
            mat: Mat::default(),
        }
    }

    fn set(capture: &mut VideoCapture, prop: i32, value: f64, what: &str) -> Result<(), VisionError> {
        let accepted = capture
            .set(prop, value)
            .map_err(|e| VisionError::Camera(format!("Failed to set {}: {}", what, e)))?;
        if !accepted {
            warn!("Camera backend ignored {} = {}", what, value);
        }
        Ok(())
    }

    fn configure(&self, capture: &mut VideoCapture) -> Result<(), VisionError> {
        let (width, height) = self.config.resolution;
        if width == 0 || height == 0 || self.config.frame_rate == 0 {
            return Err(VisionError::Camera("Invalid camera resolution or frame rate".to_string()));
        }

        Self::set(capture, CAP_PROP_FRAME_WIDTH, width as f64, "width")?;
        Self::set(capture, CAP_PROP_FRAME_HEIGHT, height as f64, "height")?;
        Self::set(capture, CAP_PROP_FPS, self.config.frame_rate as f64, "FPS")?;
        Self::set(capture, CAP_PROP_ISO_SPEED, self.config.iso as f64, "ISO")?;
        // V4L2 takes exposure in units of 100us
        Self::set(
            capture,
            CAP_PROP_EXPOSURE,
            self.config.shutter_speed_us as f64 / 100.0,
            "exposure",
        )?;
        let auto_wb = if self.config.awb_mode == "off" { 0.0 } else { 1.0 };
        Self::set(capture, CAP_PROP_AUTO_WB, auto_wb, "auto white balance")?;
        if let Some(gains) = self.config.awb_gains {
            debug!(?gains, "Manual white balance gains are not exposed by this backend");
        }
        Ok(())
    }
}

impl Camera for OpenCvCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), VisionError> {
        let id = self.config.device_id;
        let mut capture = VideoCapture::new(id as i32, CAP_ANY)
            .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", id, e)))?;

        if !capture
            .is_opened()
            .map_err(|e| VisionError::Camera(format!("Camera {} not opened: {}", id, e)))?
        {
            return Err(VisionError::Camera(format!("Camera {} failed to open", id)));
        }

        self.configure(&mut capture)?;

        let width = capture.get(CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)?;
        if width > 0.0 && height > 0.0 {
            self.resolution = (width as u32, height as u32);
        }

        info!(
            "Camera {} initialized at {}x{} @ {}fps",
            id, self.resolution.0, self.resolution.1, self.config.frame_rate
        );
        self.capture = Some(capture);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgr
    }

    fn read_into(&mut self, buffer: &mut RgbImage) -> Result<(), VisionError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| VisionError::Camera("Camera not opened".to_string()))?;

        if !capture.read(&mut self.mat)? || self.mat.empty() {
            return Err(VisionError::Camera("Camera returned an empty frame".to_string()));
        }
        if self.mat.channels() != 3 {
            return Err(VisionError::Camera(format!(
                "Expected 3 channels, got {}",
                self.mat.channels()
            )));
        }

        let width = self.mat.cols() as u32;
        let height = self.mat.rows() as u32;
        if buffer.dimensions() != (width, height) {
            *buffer = RgbImage::new(width, height);
        }

        let bytes = self.mat.data_bytes()?;
        if bytes.len() != buffer.len() {
            return Err(VisionError::Camera(format!(
                "Frame size mismatch: {} bytes for {}x{}",
                bytes.len(),
                width,
                height
            )));
        }
        buffer.copy_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Failed to release camera {}: {}", self.config.device_id, e);
            }
            info!("Camera {} released", self.config.device_id);
        }
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.close();
    }
}
