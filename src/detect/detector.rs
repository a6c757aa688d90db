//! Rectangle detection oracle.
//!
//! Finds the single best assay-strip boundary in a frame: grayscale,
//! Otsu binarization in both polarities, boundary tracing, polygon
//! simplification, then constraint filtering. When several candidates
//! satisfy the constraints the largest area wins; the tie-break is
//! deterministic by construction.

use super::contours::{binarize, find_contours, is_convex, otsu_threshold, perimeter,
    simplify_closed};
use super::quad::{Point, Quad};
use crate::capture::{Frame, PixelFormat};
use serde::{Deserialize, Serialize};

/// Geometric constraints applied to detection candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum accepted aspect ratio (width over height).
    pub min_aspect_ratio: f64,
    /// Maximum accepted aspect ratio.
    pub max_aspect_ratio: f64,
    /// Minimum shortest quad side relative to the shorter frame
    /// dimension.
    pub min_size: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_aspect_ratio: 0.7,
            max_aspect_ratio: 1.2,
            min_size: 0.2,
        }
    }
}

impl DetectionConfig {
    /// Validates the constraint parameters.
    pub fn validate(&self) -> Result<(), crate::capture::ConfigError> {
        if self.min_aspect_ratio <= 0.0 || self.max_aspect_ratio < self.min_aspect_ratio {
            return Err(crate::capture::ConfigError::InvalidConstraint(
                "aspect ratio bounds must satisfy 0 < min <= max".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_size) {
            return Err(crate::capture::ConfigError::InvalidConstraint(
                "min_size must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Produces at most one quadrilateral candidate per frame.
///
/// Detection is invoked asynchronously relative to frame delivery; the
/// pipeline treats results as arriving on an arbitrary thread.
pub trait DetectionOracle: Send + Sync {
    /// Returns the best boundary candidate in the frame, if any.
    fn detect(&self, frame: &Frame) -> Option<Quad>;
}

/// Contour-based implementation of [`DetectionOracle`].
#[derive(Debug, Clone)]
pub struct RectangleDetector {
    config: DetectionConfig,
}

impl RectangleDetector {
    /// Creates a detector with the given constraints.
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Returns the active constraints.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    fn candidates_in_mask(
        &self,
        mask: &[u8],
        width: u32,
        height: u32,
        out: &mut Vec<([(f64, f64); 4], f64)>,
    ) {
        for contour in find_contours(mask, width, height) {
            if contour.len() < 8 {
                continue;
            }
            let points: Vec<(f64, f64)> = contour
                .iter()
                .map(|&(x, y)| (f64::from(x), f64::from(y)))
                .collect();
            let epsilon = (0.02 * perimeter(&points)).max(2.0);
            let poly = simplify_closed(&points, epsilon);
            if poly.len() != 4 || !is_convex(&poly) {
                continue;
            }
            let corners = order_corners(&poly);
            if let Some(area) = self.check_constraints(&corners, width, height) {
                out.push((corners, area));
            }
        }
    }

    /// Applies aspect, size, and placement constraints; returns the
    /// pixel-space area of an accepted candidate.
    fn check_constraints(
        &self,
        corners: &[(f64, f64); 4],
        width: u32,
        height: u32,
    ) -> Option<f64> {
        let [tl, tr, br, bl] = *corners;
        let w = f64::from(width);
        let h = f64::from(height);

        // A boundary hugging the frame edge is the frame itself, not a
        // strip inside the view.
        for (x, y) in corners {
            if *x < 1.0 || *y < 1.0 || *x > w - 2.0 || *y > h - 2.0 {
                return None;
            }
        }

        let top = dist(tl, tr);
        let bottom = dist(bl, br);
        let left = dist(tl, bl);
        let right = dist(tr, br);

        let quad_width = (top + bottom) / 2.0;
        let quad_height = (left + right) / 2.0;
        if quad_height < 1.0 {
            return None;
        }

        let aspect = quad_width / quad_height;
        if aspect < self.config.min_aspect_ratio || aspect > self.config.max_aspect_ratio {
            return None;
        }

        let shortest = top.min(bottom).min(left).min(right);
        if shortest / w.min(h) < self.config.min_size {
            return None;
        }

        Some(polygon_area(corners))
    }
}

impl DetectionOracle for RectangleDetector {
    fn detect(&self, frame: &Frame) -> Option<Quad> {
        let width = frame.width();
        let height = frame.height();
        let gray = luminance(frame);
        let threshold = otsu_threshold(&gray);

        let mut candidates = Vec::new();
        for dark_foreground in [true, false] {
            let mask = binarize(&gray, threshold, dark_foreground);
            self.candidates_in_mask(&mask, width, height, &mut candidates);
        }

        let (corners, area) = candidates.into_iter().max_by(|(_, a), (_, b)| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        })?;

        tracing::trace!(area, "rectangle candidate accepted");
        Some(normalize_quad(&corners, width, height))
    }
}

/// Converts a frame to 8-bit luminance.
pub fn luminance(frame: &Frame) -> Vec<u8> {
    match frame.format() {
        PixelFormat::Gray8 => frame.pixels().to_vec(),
        PixelFormat::Rgba8 => frame
            .pixels()
            .chunks_exact(4)
            .map(|px| {
                let y = 0.299 * f64::from(px[0])
                    + 0.587 * f64::from(px[1])
                    + 0.114 * f64::from(px[2]);
                (y + 0.5).min(255.0) as u8
            })
            .collect(),
    }
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn polygon_area(corners: &[(f64, f64); 4]) -> f64 {
    let mut area = 0.0;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        area += a.0 * b.1 - b.0 * a.1;
    }
    area.abs() / 2.0
}

/// Orders four vertices as top-left, top-right, bottom-right,
/// bottom-left in top-left-origin pixel space.
fn order_corners(poly: &[(f64, f64)]) -> [(f64, f64); 4] {
    let cy = poly.iter().map(|p| p.1).sum::<f64>() / poly.len() as f64;

    let mut top: Vec<(f64, f64)> = poly.iter().copied().filter(|p| p.1 < cy).collect();
    let mut bottom: Vec<(f64, f64)> = poly.iter().copied().filter(|p| p.1 >= cy).collect();
    top.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    bottom.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    if top.len() != 2 || bottom.len() != 2 {
        // Strong rotation: fall back to diagonal extremes.
        let mut pts = poly.to_vec();
        pts.sort_by(|a, b| {
            (a.0 + a.1)
                .partial_cmp(&(b.0 + b.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let tl = pts[0];
        let br = pts[3];
        let (c, d) = (pts[1], pts[2]);
        let (tr, bl) = if c.0 - c.1 > d.0 - d.1 { (c, d) } else { (d, c) };
        return [tl, tr, br, bl];
    }

    [top[0], top[1], bottom[1], bottom[0]]
}

/// Scales pixel corners to normalized bottom-left-origin coordinates.
fn normalize_quad(corners: &[(f64, f64); 4], width: u32, height: u32) -> Quad {
    let w = f64::from(width);
    let h = f64::from(height);
    let norm = |(x, y): (f64, f64)| Point::new(x / w, 1.0 - y / h);
    Quad::new(
        norm(corners[0]),
        norm(corners[1]),
        norm(corners[2]),
        norm(corners[3]),
    )
}
