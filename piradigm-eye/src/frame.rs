//! Camera frames and colour-space conversion
//!
//! HSV images use the 8-bit half-turn encoding: hue in `0..180`,
//! saturation and value in `0..=255`.

use image::{imageops, GrayImage, ImageBuffer, Rgb, RgbImage};
use imageproc::map::map_colors;
use std::time::Instant;

/// Three-channel image whose channels are hue, saturation and value
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Largest hue value in the half-turn encoding
pub const HUE_MAX: u8 = 180;

/// Channel order of the raw camera buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgr,
}

/// One captured image.
///
/// Frames are read-only once published. The pixel buffer is handed back to
/// the capture side after processing so the next capture can reuse it.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
    format: PixelFormat,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: RgbImage, format: PixelFormat, sequence: u64) -> Self {
        Self {
            pixels,
            format,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Frame built from an RGB image, mostly useful in tests
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self::new(pixels, PixelFormat::Rgb, 0)
    }

    /// Zero-sized frame that owns no pixel storage
    pub(crate) fn placeholder() -> Self {
        Self::new(RgbImage::new(0, 0), PixelFormat::Rgb, 0)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Capture counter assigned by the frame source
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Raw buffer in [`Frame::format`] channel order
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    /// Pixel at (x, y) in RGB order regardless of the raw format
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let [a, b, c] = self.pixels.get_pixel(x, y).0;
        match self.format {
            PixelFormat::Rgb => [a, b, c],
            PixelFormat::Bgr => [c, b, a],
        }
    }

    /// Copy of the pixels in RGB order
    pub fn to_rgb(&self) -> RgbImage {
        match self.format {
            PixelFormat::Rgb => self.pixels.clone(),
            PixelFormat::Bgr => map_colors(&self.pixels, |Rgb([b, g, r])| Rgb([r, g, b])),
        }
    }

    pub fn to_hsv(&self) -> HsvImage {
        map_colors(&self.to_rgb(), |px| Rgb(rgb_to_hsv(px.0)))
    }

    pub fn to_gray(&self) -> GrayImage {
        imageops::grayscale(&self.to_rgb())
    }
}

/// RGB to 8-bit HSV
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max == 0.0 { 0.0 } else { diff * 255.0 / max };

    let mut h = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u16 % HUE_MAX as u16;
    [h as u8, s.round() as u8, max as u8]
}

/// 8-bit HSV to RGB
pub fn hsv_to_rgb([h, s, v]: [u8; 3]) -> [u8; 3] {
    let degrees = (h % HUE_MAX) as f32 * 2.0;
    let sf = s as f32 / 255.0;
    let vf = v as f32 / 255.0;

    let c = vf * sf;
    let sector = degrees / 60.0;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = vf - c;
    let to_u8 = |channel: f32| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r1), to_u8(g1), to_u8(b1)]
}

/// Copy out the rectangle starting at (x, y), clipped to the image bounds
pub fn crop(image: &HsvImage, x: u32, y: u32, width: u32, height: u32) -> HsvImage {
    let x = x.min(image.width());
    let y = y.min(image.height());
    let width = width.min(image.width() - x);
    let height = height.min(image.height() - y);
    imageops::crop_imm(image, x, y, width, height).to_image()
}

/// Gray image of the hue channel alone: saturation and value are forced to
/// full before converting back, so only colour changes produce edges.
pub fn hue_only_gray(hsv: &HsvImage) -> GrayImage {
    let saturated: RgbImage = map_colors(hsv, |Rgb([h, _, _])| Rgb(hsv_to_rgb([h, 255, 255])));
    imageops::grayscale(&saturated)
}
