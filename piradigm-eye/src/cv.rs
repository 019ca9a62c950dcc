//! OpenCV `imgproc` implementations of the colour model and detectors
//!
//! Images cross into OpenCV as continuous 8-bit `Mat`s and come back as
//! `image` buffers, so callers see the same types as the native path.

use crate::colour::{ColourRange, MASK_ON};
use crate::error::VisionError;
use crate::frame::{Frame, HsvImage, PixelFormat, HUE_MAX};
use crate::processing::{Circle, CircleDetector, CircleParams, Detection};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;
use opencv::{
    core::{self, Mat, Point, Scalar, Vec3f, Vector},
    imgproc,
    prelude::*,
};
use tracing::trace;

fn mat_from_bytes(width: u32, height: u32, typ: i32, bytes: &[u8]) -> Result<Mat, VisionError> {
    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    let data = mat.data_bytes_mut()?;
    if data.len() != bytes.len() {
        return Err(VisionError::Processing(format!(
            "Cannot wrap {} bytes as a {}x{} matrix of {} bytes",
            bytes.len(),
            width,
            height,
            data.len()
        )));
    }
    data.copy_from_slice(bytes);
    Ok(mat)
}

fn rgb_mat(image: &RgbImage) -> Result<Mat, VisionError> {
    mat_from_bytes(image.width(), image.height(), core::CV_8UC3, image.as_raw())
}

fn gray_mat(image: &GrayImage) -> Result<Mat, VisionError> {
    mat_from_bytes(image.width(), image.height(), core::CV_8UC1, image.as_raw())
}

fn mat_bytes(mat: &Mat, typ: i32) -> Result<(u32, u32, Vec<u8>), VisionError> {
    if mat.typ() != typ {
        return Err(VisionError::Processing(format!(
            "Unexpected matrix type {} (wanted {})",
            mat.typ(),
            typ
        )));
    }
    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };
    Ok((mat.cols() as u32, mat.rows() as u32, mat.data_bytes()?.to_vec()))
}

fn three_channel(mat: &Mat) -> Result<RgbImage, VisionError> {
    let (width, height, bytes) = mat_bytes(mat, core::CV_8UC3)?;
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| VisionError::Processing("Matrix smaller than its dimensions".to_string()))
}

fn one_channel(mat: &Mat) -> Result<GrayImage, VisionError> {
    let (width, height, bytes) = mat_bytes(mat, core::CV_8UC1)?;
    GrayImage::from_raw(width, height, bytes)
        .ok_or_else(|| VisionError::Processing("Matrix smaller than its dimensions".to_string()))
}

fn empty_mask(width: u32, height: u32) -> Result<Mat, VisionError> {
    Ok(Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        core::CV_8UC1,
        Scalar::all(0.0),
    )?)
}

pub(crate) fn to_hsv(frame: &Frame) -> Result<HsvImage, VisionError> {
    let code = match frame.format() {
        PixelFormat::Rgb => imgproc::COLOR_RGB2HSV,
        PixelFormat::Bgr => imgproc::COLOR_BGR2HSV,
    };
    let src = rgb_mat(frame.pixels())?;
    let mut hsv = Mat::default();
    imgproc::cvt_color(&src, &mut hsv, code, 0)?;
    three_channel(&hsv)
}

pub(crate) fn hue_only_gray(hsv: &HsvImage) -> Result<GrayImage, VisionError> {
    let saturated: HsvImage = map_colors(hsv, |Rgb([h, _, _])| Rgb([h, 255, 255]));
    let src = rgb_mat(&saturated)?;
    let mut rgb = Mat::default();
    imgproc::cvt_color(&src, &mut rgb, imgproc::COLOR_HSV2RGB, 0)?;
    let mut gray = Mat::default();
    imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;
    one_channel(&gray)
}

fn bounds(lower: [f32; 3], upper: [f32; 3]) -> (Scalar, Scalar) {
    (
        Scalar::new(lower[0] as f64, lower[1] as f64, lower[2] as f64, 0.0),
        Scalar::new(upper[0] as f64, upper[1] as f64, upper[2] as f64, 0.0),
    )
}

pub(crate) fn threshold(hsv: &HsvImage, range: &ColourRange) -> Result<GrayImage, VisionError> {
    let src = rgb_mat(hsv)?;
    let [h_lo, s_lo, v_lo] = range.lower;
    let [h_hi, s_hi, v_hi] = range.upper;

    let mut mask = Mat::default();
    if range.wraps_hue() {
        let (lo, hi) = bounds([0.0, s_lo, v_lo], [h_hi, s_hi, v_hi]);
        let mut low_band = Mat::default();
        core::in_range(&src, &lo, &hi, &mut low_band)?;

        let (lo, hi) = bounds([h_lo, s_lo, v_lo], [HUE_MAX as f32, s_hi, v_hi]);
        let mut high_band = Mat::default();
        core::in_range(&src, &lo, &hi, &mut high_band)?;

        core::bitwise_or(&low_band, &high_band, &mut mask, &core::no_array())?;
    } else {
        let (lo, hi) = bounds(range.lower, range.upper);
        core::in_range(&src, &lo, &hi, &mut mask)?;
    }
    one_channel(&mask)
}

pub(crate) fn colour_limits(hsv: &HsvImage, sigmas: f32) -> Result<Option<ColourRange>, VisionError> {
    let (w, h) = hsv.dimensions();
    if w == 0 || h == 0 {
        return Ok(None);
    }

    let src = rgb_mat(hsv)?;
    let mut mask = empty_mask(w, h)?;
    imgproc::circle(
        &mut mask,
        Point::new((w / 2) as i32, (h / 2) as i32),
        (w.min(h) / 2) as i32,
        Scalar::all(MASK_ON as f64),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    if core::count_non_zero(&mask)? == 0 {
        return Ok(None);
    }

    let mut mean = Mat::default();
    let mut stddev = Mat::default();
    core::mean_std_dev(&src, &mut mean, &mut stddev, &mask)?;

    let mut lower = [0f32; 3];
    let mut upper = [0f32; 3];
    for c in 0..3 {
        let m = *mean.at::<f64>(c as i32)?;
        let spread = sigmas as f64 * *stddev.at::<f64>(c as i32)?;
        lower[c] = (m - spread) as f32;
        upper[c] = (m + spread) as f32;
    }
    Ok(Some(ColourRange { lower, upper }))
}

/// Largest outer contour of `mask`, sized by contour area and placed at its
/// moment centroid. Equal areas keep the contour OpenCV reports first.
pub(crate) fn largest_region(mask: &GrayImage) -> Result<Option<Detection>, VisionError> {
    let binary: GrayImage = map_colors(mask, |Luma([p])| Luma([if p != 0 { MASK_ON } else { 0 }]));
    let src = gray_mat(&binary)?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &src,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::default(),
    )?;

    let mut best: Option<(f64, Vector<Point>)> = None;
    for contour in contours {
        let area = imgproc::contour_area(&contour, false)?;
        if area > 1.0 && best.as_ref().map_or(true, |(a, _)| area > *a) {
            best = Some((area, contour));
        }
    }

    let Some((area, contour)) = best else {
        return Ok(None);
    };
    let moments = imgproc::moments(&contour, false)?;
    if moments.m00 == 0.0 {
        return Ok(None);
    }
    Ok(Some(Detection::new(
        (moments.m10 / moments.m00) as f32,
        (moments.m01 / moments.m00) as f32,
        area as f32,
    )))
}

/// `imgproc::hough_circles` with the gradient method
#[derive(Debug, Clone, Default)]
pub struct OpenCvCircles {
    params: CircleParams,
}

impl OpenCvCircles {
    pub fn new(params: CircleParams) -> Self {
        Self { params }
    }
}

impl CircleDetector for OpenCvCircles {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<Circle>, VisionError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }
        let src = gray_mat(gray)?;
        let mut found = Vector::<Vec3f>::new();
        imgproc::hough_circles(
            &src,
            &mut found,
            imgproc::HOUGH_GRADIENT,
            1.0,
            self.params.min_dist as f64,
            self.params.edge_threshold as f64,
            self.params.accumulator_threshold as f64,
            self.params.min_radius as i32,
            self.params.max_radius as i32,
        )?;

        let circles: Vec<Circle> = found
            .iter()
            .map(|c| {
                let [x, y, radius] = c.0;
                Circle { x, y, radius, votes: 0 }
            })
            .collect();
        trace!(circles = circles.len(), "OpenCV Hough pass");
        Ok(circles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour;
    use crate::frame::rgb_to_hsv;
    use crate::processing::largest_blob;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }

    #[test]
    fn test_hsv_of_primaries() {
        let pixels = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let hsv = to_hsv(&Frame::from_rgb(pixels.clone())).unwrap();
        for x in 0..3 {
            assert_eq!(hsv.get_pixel(x, 0).0, rgb_to_hsv(pixels.get_pixel(x, 0).0));
        }
    }

    #[test]
    fn test_wrapping_threshold_matches_native() {
        let hsv = HsvImage::from_fn(3, 1, |x, _| Rgb([[5, 90, 175][x as usize], 200, 200]));
        let range = ColourRange::new([170.0, 100.0, 100.0], [10.0, 255.0, 255.0]);
        assert_eq!(threshold(&hsv, &range).unwrap(), colour::threshold(&hsv, &range));
    }

    #[test]
    fn test_uniform_limits_collapse_to_mean() {
        let hsv = HsvImage::from_pixel(16, 12, Rgb([42, 180, 90]));
        let range = colour_limits(&hsv, 1.5).unwrap().unwrap();
        assert_eq!(range.lower, [42.0, 180.0, 90.0]);
        assert_eq!(range.upper, [42.0, 180.0, 90.0]);
    }

    #[test]
    fn test_largest_region_agrees_with_labelling() {
        let mut mask = GrayImage::new(40, 20);
        fill(&mut mask, 0, 0, 5, 2);
        fill(&mut mask, 10, 0, 10, 5);
        fill(&mut mask, 25, 10, 6, 5);

        let found = largest_region(&mask).unwrap().unwrap();
        let blob = largest_blob(&mask).unwrap();
        assert!((found.x - blob.centroid.0).abs() < 0.5);
        assert!((found.y - blob.centroid.1).abs() < 0.5);
        assert!(largest_region(&GrayImage::new(8, 8)).unwrap().is_none());
    }

    #[test]
    fn test_hough_finds_disc() {
        let gray = GrayImage::from_fn(40, 40, |x, y| {
            let dx = x as i32 - 20;
            let dy = y as i32 - 20;
            Luma([if dx * dx + dy * dy <= 64 { 220 } else { 20 }])
        });
        let best = OpenCvCircles::default().largest(&gray).unwrap().unwrap();
        assert!((best.x - 20.0).abs() <= 2.0, "x = {}", best.x);
        assert!((best.y - 20.0).abs() <= 2.0, "y = {}", best.y);
    }
}
