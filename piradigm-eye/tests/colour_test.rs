//! Colour model behaviour on whole frames

use image::{Rgb, RgbImage};
use piradigm_eye::colour::{get_limits, threshold, MASK_ON};
use piradigm_eye::frame::rgb_to_hsv;
use piradigm_eye::processing::largest_blob;
use piradigm_eye::{ColourRange, Frame, HsvImage};
use proptest::prelude::*;

#[test]
fn test_calibrate_then_find_target() {
    // a red square on a green background, the calibration frame is all red
    let red = [230, 20, 20];
    let green = [20, 200, 20];

    let calibration = Frame::from_rgb(RgbImage::from_pixel(32, 32, Rgb(red)));
    let range = get_limits(&calibration.to_hsv(), 1.5).unwrap().clamped();

    let scene = RgbImage::from_fn(64, 48, |x, y| {
        if (40..50).contains(&x) && (10..20).contains(&y) {
            Rgb(red)
        } else {
            Rgb(green)
        }
    });
    let mask = threshold(&Frame::from_rgb(scene).to_hsv(), &range);
    let blob = largest_blob(&mask).unwrap();
    assert_eq!(blob.area, 100);
    assert_eq!(blob.centroid, (44.5, 14.5));
}

#[test]
fn test_full_range_accepts_everything() {
    let frame = Frame::from_rgb(RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 90])));
    let mask = threshold(&frame.to_hsv(), &ColourRange::default());
    assert!(mask.pixels().all(|p| p.0[0] == MASK_ON));
}

proptest! {
    #[test]
    fn test_mask_agrees_with_contains(
        pixels in prop::collection::vec(any::<[u8; 3]>(), 1..64),
        lo in prop::array::uniform3(0f32..255.0),
        hi in prop::array::uniform3(0f32..255.0),
    ) {
        let width = pixels.len() as u32;
        let hsv = HsvImage::from_fn(width, 1, |x, _| Rgb(rgb_to_hsv(pixels[x as usize])));
        // only hue may wrap
        let lower = [lo[0].min(180.0), lo[1].min(hi[1]), lo[2].min(hi[2])];
        let upper = [hi[0].min(180.0), lo[1].max(hi[1]), lo[2].max(hi[2])];
        let range = ColourRange::new(lower, upper);

        let mask = threshold(&hsv, &range);
        for x in 0..width {
            let inside = mask.get_pixel(x, 0).0[0] == MASK_ON;
            prop_assert_eq!(inside, range.contains(hsv.get_pixel(x, 0).0));
        }
    }
}
