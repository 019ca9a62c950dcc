//! HSV colour ranges: calibration from frame statistics and masking
//!
//! A range whose hue lower bound exceeds its upper bound wraps through zero
//! (red is the usual case, e.g. 170..10). Saturation and value are always
//! simple intervals.

use crate::frame::{HsvImage, HUE_MAX};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::map::{map_colors, map_colors2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mask value for pixels inside a range
pub const MASK_ON: u8 = 255;

/// Lower and upper HSV bounds.
///
/// Bounds are kept as floating point because calibration produces
/// `mean ± k·σ` values that may fall outside the channel limits; see
/// [`ColourRange::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColourRange {
    pub lower: [f32; 3],
    pub upper: [f32; 3],
}

impl Default for ColourRange {
    /// Everything passes
    fn default() -> Self {
        Self::full()
    }
}

impl ColourRange {
    pub fn new(lower: [f32; 3], upper: [f32; 3]) -> Self {
        Self { lower, upper }
    }

    /// Range that accepts every pixel
    pub fn full() -> Self {
        Self {
            lower: [0.0, 0.0, 0.0],
            upper: [HUE_MAX as f32, 255.0, 255.0],
        }
    }

    /// True when the hue interval crosses zero
    pub fn wraps_hue(&self) -> bool {
        self.lower[0] > self.upper[0]
    }

    /// Bounds pulled into the valid channel limits (hue `0..=180`,
    /// saturation and value `0..=255`). A wrapping hue stays wrapping.
    pub fn clamped(&self) -> Self {
        let limits = [HUE_MAX as f32, 255.0, 255.0];
        let mut lower = self.lower;
        let mut upper = self.upper;
        for c in 0..3 {
            lower[c] = clamp_channel(lower[c], limits[c]);
            upper[c] = clamp_channel(upper[c], limits[c]);
        }
        Self { lower, upper }
    }

    /// Test one HSV pixel against the range
    pub fn contains(&self, [h, s, v]: [u8; 3]) -> bool {
        let within = |value: u8, lo: f32, hi: f32| {
            let value = value as f32;
            value >= lo && value <= hi
        };
        let hue_ok = if self.wraps_hue() {
            within(h, 0.0, self.upper[0]) || within(h, self.lower[0], HUE_MAX as f32)
        } else {
            within(h, self.lower[0], self.upper[0])
        };
        hue_ok
            && within(s, self.lower[1], self.upper[1])
            && within(v, self.lower[2], self.upper[2])
    }
}

fn clamp_channel(value: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Per-pixel test against contiguous bounds on all three channels;
/// matching pixels are set to [`MASK_ON`].
pub fn in_range(image: &HsvImage, lower: [f32; 3], upper: [f32; 3]) -> GrayImage {
    map_colors(image, |px| {
        let inside = (0..3).all(|c| {
            let value = px.0[c] as f32;
            value >= lower[c] && value <= upper[c]
        });
        Luma([if inside { MASK_ON } else { 0 }])
    })
}

/// Mask for `range`, splitting a wrapping hue interval into
/// `[0, upper] ∪ [lower, HUE_MAX]`.
pub fn threshold(image: &HsvImage, range: &ColourRange) -> GrayImage {
    let [h_lo, s_lo, v_lo] = range.lower;
    let [h_hi, s_hi, v_hi] = range.upper;

    if !range.wraps_hue() {
        return in_range(image, range.lower, range.upper);
    }

    let low_band = in_range(image, [0.0, s_lo, v_lo], [h_hi, s_hi, v_hi]);
    let high_band = in_range(image, [h_lo, s_lo, v_lo], [HUE_MAX as f32, s_hi, v_hi]);
    bitwise_or(&low_band, &high_band)
}

/// Pixel-wise OR of two equally sized masks
pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    map_colors2(a, b, |Luma([p]), Luma([q])| Luma([p | q]))
}

/// Suggest a range from the centre of `image`.
///
/// Uses the pixels under a filled disc of radius `min(w, h) / 2` drawn at
/// the image centre, and returns `mean ± sigmas · stddev` per channel
/// (population standard deviation). Results are not clamped. Returns `None`
/// for an empty image.
pub fn get_limits(image: &HsvImage, sigmas: f32) -> Option<ColourRange> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let mut mask = GrayImage::new(w, h);
    draw_filled_circle_mut(
        &mut mask,
        ((w / 2) as i32, (h / 2) as i32),
        (w.min(h) / 2) as i32,
        Luma([MASK_ON]),
    );

    let mut count = 0u64;
    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for (px, _) in image.pixels().zip(mask.pixels()).filter(|(_, m)| m.0[0] != 0) {
        count += 1;
        for c in 0..3 {
            let value = px.0[c] as f64;
            sum[c] += value;
            sum_sq[c] += value * value;
        }
    }

    if count == 0 {
        return None;
    }

    let n = count as f64;
    let mut lower = [0f32; 3];
    let mut upper = [0f32; 3];
    for c in 0..3 {
        let mean = sum[c] / n;
        let variance = (sum_sq[c] / n - mean * mean).max(0.0);
        let spread = sigmas as f64 * variance.sqrt();
        lower[c] = (mean - spread) as f32;
        upper[c] = (mean + spread) as f32;
    }

    debug!(pixels = count, ?lower, ?upper, "Computed colour limits");
    Some(ColourRange { lower, upper })
}
