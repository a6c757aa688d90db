//! Detected quadrilateral type and coordinate transforms.

use serde::{Deserialize, Serialize};

/// A 2-D point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle in top-left-origin pixel coordinates,
/// ready for overlay drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    /// Left edge in pixels.
    pub x: f64,
    /// Top edge in pixels.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

/// Four-corner boundary of the assay strip within a frame.
///
/// Corners are stored in normalized `[0,1]` coordinates with a
/// **bottom-left origin**, the detection oracle's native convention.
/// [`Quad::overlay_rect`] flips into top-left-origin pixel space for
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    /// Visually top-left corner.
    pub top_left: Point,
    /// Visually top-right corner.
    pub top_right: Point,
    /// Visually bottom-right corner.
    pub bottom_right: Point,
    /// Visually bottom-left corner.
    pub bottom_left: Point,
}

impl Quad {
    /// Creates a quad from its four corners.
    pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Corners in drawing order: top-left, top-right, bottom-right,
    /// bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// True if any three corners are (nearly) collinear.
    ///
    /// A degenerate quad cannot anchor a perspective transform; the
    /// rectifier refuses it explicitly.
    pub fn is_degenerate(&self) -> bool {
        const EPS: f64 = 1e-7;
        let c = self.corners();
        for skip in 0..4 {
            let pts: Vec<Point> = (0..4).filter(|&i| i != skip).map(|i| c[i]).collect();
            let cross = (pts[1].x - pts[0].x) * (pts[2].y - pts[0].y)
                - (pts[1].y - pts[0].y) * (pts[2].x - pts[0].x);
            if cross.abs() < EPS {
                return true;
            }
        }
        false
    }

    /// Normalized bounding box as `(min_x, min_y, width, height)`,
    /// bottom-left origin.
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let c = self.corners();
        let min_x = c.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = c.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = c.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = c.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        (min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Signed area via the shoelace formula, in normalized units.
    pub fn area(&self) -> f64 {
        let c = self.corners();
        let mut area = 0.0;
        for i in 0..4 {
            let j = (i + 1) % 4;
            area += c[i].x * c[j].y - c[j].x * c[i].y;
        }
        area.abs() / 2.0
    }

    /// Maps the bounding box into top-left-origin pixel space.
    ///
    /// Detection coordinates are bottom-left-origin normalized; display
    /// coordinates are top-left-origin pixels, so the box is flipped
    /// vertically and scaled by preview dimensions.
    pub fn overlay_rect(&self, preview_width: f64, preview_height: f64) -> OverlayRect {
        let (min_x, min_y, w, h) = self.bounding_box();
        OverlayRect {
            x: min_x * preview_width,
            y: (1.0 - min_y - h) * preview_height,
            width: w * preview_width,
            height: h * preview_height,
        }
    }
}
