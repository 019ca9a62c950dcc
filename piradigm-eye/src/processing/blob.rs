//! Connected regions of a binary mask

use super::detection::Detection;
use image::{GrayImage, Luma};
use imageproc::map::map_colors;
use imageproc::region_labelling::{connected_components, Connectivity};

/// One 8-connected region of non-zero mask pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Pixel count (zeroth moment)
    pub area: u32,
    /// First-moment centroid
    pub centroid: (f32, f32),
    /// Top-most, then left-most pixel of the region
    pub first_pixel: (u32, u32),
    /// Inclusive bounds (min_x, min_y, max_x, max_y)
    pub bbox: (u32, u32, u32, u32),
}

impl Blob {
    /// `None` for an empty region, which has no centroid
    pub fn detection(&self) -> Option<Detection> {
        if self.area == 0 {
            return None;
        }
        Some(Detection::new(self.centroid.0, self.centroid.1, self.area as f32))
    }
}

/// All regions of `mask`, in row-major order of their first pixel
pub fn find_blobs(mask: &GrayImage) -> Vec<Blob> {
    let binary: GrayImage = map_colors(mask, |Luma([p])| Luma([u8::from(p != 0)]));
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    // indexed by label - 1; sums of x and y ride alongside
    let mut regions: Vec<Option<(Blob, f64, f64)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if label > regions.len() {
            regions.resize(label, None);
        }
        let (blob, sum_x, sum_y) = regions[label - 1].get_or_insert((
            Blob {
                area: 0,
                centroid: (0.0, 0.0),
                first_pixel: (x, y),
                bbox: (x, y, x, y),
            },
            0.0,
            0.0,
        ));
        blob.area += 1;
        blob.bbox.0 = blob.bbox.0.min(x);
        blob.bbox.1 = blob.bbox.1.min(y);
        blob.bbox.2 = blob.bbox.2.max(x);
        blob.bbox.3 = blob.bbox.3.max(y);
        *sum_x += x as f64;
        *sum_y += y as f64;
    }

    let mut blobs: Vec<Blob> = regions
        .into_iter()
        .flatten()
        .map(|(mut blob, sum_x, sum_y)| {
            let n = blob.area as f64;
            blob.centroid = ((sum_x / n) as f32, (sum_y / n) as f32);
            blob
        })
        .collect();
    blobs.sort_by_key(|b| (b.first_pixel.1, b.first_pixel.0));
    blobs
}

/// Largest region with an area above one pixel.
///
/// Only a strictly larger region replaces the current best, so on equal
/// areas the region found first in row-major order wins.
pub fn largest_blob(mask: &GrayImage) -> Option<Blob> {
    let mut best: Option<Blob> = None;
    for blob in find_blobs(mask).into_iter().filter(|b| b.area > 1) {
        if best.map_or(true, |current| blob.area > current.area) {
            best = Some(blob);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn test_largest_of_three_regions() {
        let mut mask = GrayImage::new(40, 20);
        fill(&mut mask, 0, 0, 5, 2); // 10
        fill(&mut mask, 10, 0, 10, 5); // 50
        fill(&mut mask, 25, 10, 6, 5); // 30

        let blob = largest_blob(&mask).unwrap();
        assert_eq!(blob.area, 50);
        assert_eq!(blob.centroid, (14.5, 2.0));
        assert_eq!(blob.bbox, (10, 0, 19, 4));
    }

    #[test]
    fn test_equal_areas_first_in_scan_order_wins() {
        let mut mask = GrayImage::new(30, 20);
        fill(&mut mask, 20, 2, 4, 4);
        fill(&mut mask, 2, 10, 4, 4);

        let blob = largest_blob(&mask).unwrap();
        assert_eq!(blob.first_pixel, (20, 2));
    }

    #[test]
    fn test_single_pixels_are_ignored() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(8, 8, Luma([255]));
        assert_eq!(find_blobs(&mask).len(), 2);
        assert!(largest_blob(&mask).is_none());
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let mut mask = GrayImage::new(5, 5);
        for i in 0..5 {
            mask.put_pixel(i, i, Luma([255]));
        }
        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 5);
        assert_eq!(blobs[0].centroid, (2.0, 2.0));
    }

    #[test]
    fn test_empty_mask() {
        assert!(largest_blob(&GrayImage::new(8, 8)).is_none());
        assert!(largest_blob(&GrayImage::new(0, 0)).is_none());
    }

    #[test]
    fn test_detection_uses_area_as_size() {
        let mut mask = GrayImage::new(10, 10);
        fill(&mut mask, 2, 2, 3, 3);
        let detection = largest_blob(&mask).unwrap().detection().unwrap();
        assert_eq!(detection, Detection::new(3.0, 3.0, 9.0));
    }
}
