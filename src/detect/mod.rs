//! Assay boundary detection.
//!
//! This module turns frames into at most one quadrilateral candidate
//! under configurable geometric constraints. The oracle abstraction
//! allows swapping the contour-based detector for a mock in tests.

mod contours;
mod detector;
mod quad;

pub use contours::{binarize, find_contours, is_convex, otsu_threshold, simplify_closed};
pub use detector::{luminance, DetectionConfig, DetectionOracle, RectangleDetector};
pub use quad::{OverlayRect, Point, Quad};
