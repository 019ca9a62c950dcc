//! piradigm-eye: vision side of the piradigm challenges
//!
//! Captures frames from a camera on a dedicated thread, hands the most
//! recent one to a consumer through a single-slot mailbox, and provides the
//! colour model and detectors the challenges analyse frames with. The
//! detectors run on `image`/`imageproc` by default, or on OpenCV's
//! `imgproc` with the `opencv` feature; see [`Vision`].

pub mod camera;
pub mod colour;
#[cfg(feature = "opencv")]
pub mod cv;
pub mod error;
pub mod frame;
pub mod handoff;
pub mod processing;
pub mod source;
pub mod vision;

pub use camera::{Camera, CameraMonitor, SyntheticCamera};
#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use colour::ColourRange;
#[cfg(feature = "opencv")]
pub use cv::OpenCvCircles;
pub use error::VisionError;
pub use frame::{Frame, HsvImage, PixelFormat};
pub use handoff::{FrameLease, FrameSlot, Publish, SlotStats};
pub use processing::{
    Blob, Circle, CircleDetector, CircleParams, Detection, DetectionResult, HoughCircles,
};
pub use source::FrameSource;
pub use vision::Vision;
