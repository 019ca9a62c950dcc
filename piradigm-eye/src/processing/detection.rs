//! Detector output shared by blobs and circles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position and size of a detected target in image coordinates.
///
/// `size` is the pixel area for blobs and the radius for circles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Detection {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self { x, y, size }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}) size {:.1}", self.x, self.y, self.size)
    }
}

/// `None` when nothing passed the detector's filters
pub type DetectionResult = Option<Detection>;
