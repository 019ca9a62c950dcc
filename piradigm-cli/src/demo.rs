// Generated scenes for running challenges without a camera attached

use image::{Rgb, RgbImage};

const FIELD: Rgb<u8> = Rgb([30, 150, 40]);
const BALLOON: Rgb<u8> = Rgb([220, 25, 25]);

/// A red balloon drifting side to side across a green field, low enough to
/// sit inside the tracking crop
pub fn balloon_scene() -> impl FnMut(u64, &mut RgbImage) + Send + 'static {
    move |frame, buffer| {
        let (width, height) = buffer.dimensions();
        let span = width.saturating_sub(20).max(1) as u64;
        // triangle wave over 2 * span frames
        let phase = frame % (2 * span);
        let offset = if phase < span { phase } else { 2 * span - phase };
        let cx = 10 + offset as i64;
        let cy = (height as i64 * 3) / 4;
        let radius = 6i64;

        for (x, y, px) in buffer.enumerate_pixels_mut() {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            *px = if dx * dx + dy * dy <= radius * radius { BALLOON } else { FIELD };
        }
    }
}

/// Balloon filling the centre of the frame, as held up to the camera while
/// calibrating
pub fn calibration_scene() -> impl FnMut(u64, &mut RgbImage) + Send + 'static {
    move |_, buffer| {
        let (width, height) = buffer.dimensions();
        let (cx, cy) = (width as i64 / 2, height as i64 / 2);
        let radius = (width.min(height) / 2) as i64;

        for (x, y, px) in buffer.enumerate_pixels_mut() {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            *px = if dx * dx + dy * dy <= radius * radius { BALLOON } else { FIELD };
        }
    }
}
