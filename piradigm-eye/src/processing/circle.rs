//! Circle finding on gray images with a gradient Hough transform

use super::detection::Detection;
use crate::error::VisionError;
use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use piradigm_core::TrackingConfig;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Hough circle parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleParams {
    /// Minimum distance between accepted centres
    pub min_dist: f32,
    /// Gradient magnitude an edge pixel must reach
    pub edge_threshold: f32,
    /// Votes a centre needs to become a candidate
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    /// Largest radius searched; 0 means the larger image dimension
    pub max_radius: u32,
}

impl Default for CircleParams {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for CircleParams {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            min_dist: config.min_dist,
            edge_threshold: config.edge_threshold,
            accumulator_threshold: config.accumulator_threshold,
            min_radius: config.min_radius,
            max_radius: config.max_radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Accumulator support of the centre
    pub votes: u32,
}

impl Circle {
    pub fn detection(&self) -> Detection {
        Detection::new(self.x, self.y, self.radius)
    }
}

/// Finds circle candidates in a gray image
pub trait CircleDetector: Send {
    /// Candidates, strongest first
    fn detect(&self, gray: &GrayImage) -> Result<Vec<Circle>, VisionError>;

    fn largest(&self, gray: &GrayImage) -> Result<Option<Circle>, VisionError> {
        Ok(select_largest_circle(&self.detect(gray)?))
    }
}

/// Largest radius wins; on equal radii the earlier candidate is kept
pub fn select_largest_circle(circles: &[Circle]) -> Option<Circle> {
    let mut best: Option<Circle> = None;
    for circle in circles {
        if best.map_or(true, |current| circle.radius > current.radius) {
            best = Some(*circle);
        }
    }
    best
}

struct Edge {
    x: u32,
    y: u32,
    dx: f32,
    dy: f32,
}

/// Gradient-voting Hough transform.
///
/// Every edge pixel votes for centres along its gradient direction, both
/// ways, at each radius in range. Local accumulator maxima above the vote
/// threshold become candidates, strongest first; each accepted centre gets
/// the radius most edge pixels agree on.
#[derive(Debug, Clone, Default)]
pub struct HoughCircles {
    params: CircleParams,
}

impl HoughCircles {
    pub fn new(params: CircleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CircleParams {
        &self.params
    }

    fn radius_range(&self, width: u32, height: u32) -> (u32, u32) {
        let min = self.params.min_radius.max(1);
        let max = if self.params.max_radius == 0 {
            width.max(height)
        } else {
            self.params.max_radius
        };
        (min, max)
    }

    fn edges(&self, gray: &GrayImage) -> Vec<Edge> {
        let (width, height) = gray.dimensions();
        let mut edges = Vec::new();
        if width < 3 || height < 3 {
            return edges;
        }
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);

        // border rows and columns see a clamped kernel; skip them
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let dx = gx.get_pixel(x, y).0[0] as f32;
                let dy = gy.get_pixel(x, y).0[0] as f32;
                let magnitude = (dx * dx + dy * dy).sqrt();
                if magnitude > 0.0 && magnitude >= self.params.edge_threshold {
                    edges.push(Edge {
                        x,
                        y,
                        dx: dx / magnitude,
                        dy: dy / magnitude,
                    });
                }
            }
        }
        edges
    }

    fn best_radius(&self, cx: f32, cy: f32, edges: &[Edge], min: u32, max: u32) -> Option<u32> {
        let mut histogram = vec![0u32; (max - min + 1) as usize];
        for edge in edges {
            let d = ((edge.x as f32 - cx).powi(2) + (edge.y as f32 - cy).powi(2)).sqrt();
            let r = d.round() as i64;
            if r >= min as i64 && r <= max as i64 {
                histogram[(r - min as i64) as usize] += 1;
            }
        }
        let mut best: Option<(u32, u32)> = None;
        for (i, &count) in histogram.iter().enumerate() {
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((min + i as u32, count));
            }
        }
        best.map(|(radius, _)| radius)
    }
}

impl CircleDetector for HoughCircles {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<Circle>, VisionError> {
        let (width, height) = gray.dimensions();
        let (min_r, max_r) = self.radius_range(width, height);
        if width == 0 || height == 0 || min_r > max_r {
            return Ok(Vec::new());
        }

        let edges = self.edges(gray);
        let w = width as usize;
        let mut accumulator = vec![0u32; w * height as usize];

        for edge in &edges {
            for r in min_r..=max_r {
                for sign in [-1.0f32, 1.0] {
                    let cx = (edge.x as f32 + sign * r as f32 * edge.dx).round();
                    let cy = (edge.y as f32 + sign * r as f32 * edge.dy).round();
                    if cx < 0.0 || cy < 0.0 || cx >= width as f32 || cy >= height as f32 {
                        continue;
                    }
                    accumulator[cy as usize * w + cx as usize] += 1;
                }
            }
        }

        // local maxima: strictly above left/up neighbours, not below right/down
        let mut candidates: Vec<(usize, u32)> = Vec::new();
        for (i, &votes) in accumulator.iter().enumerate() {
            if votes < self.params.accumulator_threshold.max(1) {
                continue;
            }
            let x = i % w;
            let y = i / w;
            let left = if x > 0 { accumulator[i - 1] } else { 0 };
            let right = if x + 1 < w { accumulator[i + 1] } else { 0 };
            let up = if y > 0 { accumulator[i - w] } else { 0 };
            let down = if i + w < accumulator.len() { accumulator[i + w] } else { 0 };
            if votes > left && votes >= right && votes > up && votes >= down {
                candidates.push((i, votes));
            }
        }
        // stable: equal votes keep row-major order
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let min_dist_sq = self.params.min_dist * self.params.min_dist;
        let mut circles: Vec<Circle> = Vec::new();
        for (i, votes) in candidates {
            let cx = (i % w) as f32;
            let cy = (i / w) as f32;
            let too_close = circles
                .iter()
                .any(|c| (c.x - cx).powi(2) + (c.y - cy).powi(2) < min_dist_sq);
            if too_close {
                continue;
            }
            if let Some(radius) = self.best_radius(cx, cy, &edges, min_r, max_r) {
                circles.push(Circle {
                    x: cx,
                    y: cy,
                    radius: radius as f32,
                    votes,
                });
            }
        }

        trace!(edges = edges.len(), circles = circles.len(), "Hough circle pass");
        Ok(circles)
    }
}
