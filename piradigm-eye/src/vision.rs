//! Colour conversion, masking and detection behind one selectable backend
//!
//! Challenges hold a [`Vision`] and never call a backend directly. The
//! native backend is always compiled; the OpenCV one only with the `opencv`
//! feature, and asking for it otherwise is a configuration error.

use crate::colour::{self, ColourRange};
use crate::error::VisionError;
use crate::frame::{self, Frame, HsvImage};
use crate::processing::{largest_blob, CircleDetector, CircleParams, Detection, HoughCircles};
use image::GrayImage;
use piradigm_core::VisionBackend;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Native,
    #[cfg(feature = "opencv")]
    OpenCv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vision {
    backend: Backend,
}

impl Default for Vision {
    fn default() -> Self {
        Self::native()
    }
}

impl Vision {
    pub fn native() -> Self {
        Self {
            backend: Backend::Native,
        }
    }

    pub fn new(backend: VisionBackend) -> Result<Self, VisionError> {
        let backend = match backend {
            VisionBackend::Native => Backend::Native,
            #[cfg(feature = "opencv")]
            VisionBackend::Opencv => Backend::OpenCv,
            #[cfg(not(feature = "opencv"))]
            VisionBackend::Opencv => {
                return Err(VisionError::Config(
                    "OpenCV vision backend requested but piradigm-eye was built without the opencv feature"
                        .to_string(),
                ))
            }
        };
        info!(backend = ?backend, "Vision backend selected");
        Ok(Self { backend })
    }

    pub fn backend(&self) -> VisionBackend {
        match self.backend {
            Backend::Native => VisionBackend::Native,
            #[cfg(feature = "opencv")]
            Backend::OpenCv => VisionBackend::Opencv,
        }
    }

    pub fn to_hsv(&self, frame: &Frame) -> Result<HsvImage, VisionError> {
        match self.backend {
            Backend::Native => Ok(frame.to_hsv()),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => crate::cv::to_hsv(frame),
        }
    }

    pub fn hue_only_gray(&self, hsv: &HsvImage) -> Result<GrayImage, VisionError> {
        match self.backend {
            Backend::Native => Ok(frame::hue_only_gray(hsv)),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => crate::cv::hue_only_gray(hsv),
        }
    }

    /// Mask of the pixels inside `range`, hue wraparound included
    pub fn threshold(&self, hsv: &HsvImage, range: &ColourRange) -> Result<GrayImage, VisionError> {
        match self.backend {
            Backend::Native => Ok(colour::threshold(hsv, range)),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => crate::cv::threshold(hsv, range),
        }
    }

    /// `mean ± sigmas · stddev` over the centre disc; see [`colour::get_limits`]
    pub fn colour_limits(&self, hsv: &HsvImage, sigmas: f32) -> Result<Option<ColourRange>, VisionError> {
        if !sigmas.is_finite() || sigmas < 0.0 {
            return Err(VisionError::Processing(format!(
                "sigma multiplier must be finite and non-negative, got {}",
                sigmas
            )));
        }
        match self.backend {
            Backend::Native => Ok(colour::get_limits(hsv, sigmas)),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => crate::cv::colour_limits(hsv, sigmas),
        }
    }

    /// Centroid and area of the largest region in `mask`
    pub fn largest_region(&self, mask: &GrayImage) -> Result<Option<Detection>, VisionError> {
        match self.backend {
            Backend::Native => Ok(largest_blob(mask).and_then(|blob| blob.detection())),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => crate::cv::largest_region(mask),
        }
    }

    pub fn circle_detector(&self, params: CircleParams) -> Box<dyn CircleDetector> {
        match self.backend {
            Backend::Native => Box::new(HoughCircles::new(params)),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => Box::new(crate::cv::OpenCvCircles::new(params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_native_is_default() {
        assert_eq!(Vision::default().backend(), VisionBackend::Native);
        assert_eq!(Vision::new(VisionBackend::Native).unwrap(), Vision::native());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_opencv_needs_feature() {
        match Vision::new(VisionBackend::Opencv) {
            Err(VisionError::Config(message)) => assert!(message.contains("opencv")),
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_opencv_backend_selected() {
        let vision = Vision::new(VisionBackend::Opencv).unwrap();
        assert_eq!(vision.backend(), VisionBackend::Opencv);
    }

    #[test]
    fn test_native_threshold_then_region() {
        let vision = Vision::native();
        let frame = Frame::from_rgb(RgbImage::from_fn(20, 10, |x, y| {
            if (4..8).contains(&x) && (2..6).contains(&y) {
                Rgb([220, 20, 20])
            } else {
                Rgb([20, 20, 220])
            }
        }));
        let hsv = vision.to_hsv(&frame).unwrap();
        let range = ColourRange::new([170.0, 100.0, 100.0], [10.0, 255.0, 255.0]);
        let mask = vision.threshold(&hsv, &range).unwrap();
        assert_eq!(mask.get_pixel(5, 3), &Luma([colour::MASK_ON]));

        let found = vision.largest_region(&mask).unwrap().unwrap();
        assert_eq!((found.x, found.y, found.size), (5.5, 3.5, 16.0));
    }

    #[test]
    fn test_bad_sigma_is_rejected() {
        let hsv = HsvImage::from_pixel(8, 8, Rgb([60, 200, 200]));
        for sigmas in [-1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                Vision::native().colour_limits(&hsv, sigmas),
                Err(VisionError::Processing(_))
            ));
        }
        assert!(Vision::native().colour_limits(&hsv, 0.0).unwrap().is_some());
    }
}
