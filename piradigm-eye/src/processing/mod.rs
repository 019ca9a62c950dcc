//! Vision processing: the detectors the challenges steer by
//!
//! Every detector here is a pure function of its input image and
//! parameters, so identical frames always yield identical results.

pub mod blob;
pub mod circle;
pub mod detection;

pub use blob::{find_blobs, largest_blob, Blob};
pub use circle::{select_largest_circle, Circle, CircleDetector, CircleParams, HoughCircles};
pub use detection::{Detection, DetectionResult};
