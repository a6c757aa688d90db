//! Perspective rectification.
//!
//! Maps a detected quadrilateral's content onto an upright rectangle,
//! producing the flattened still handed to the save/upload
//! collaborator. Rectification is deterministic: identical frame and
//! quad inputs yield byte-identical output.

mod homography;

pub use homography::{apply, sample_bilinear, unit_square_to_quad};

use crate::capture::{Frame, PixelFormat};
use crate::detect::Quad;
use thiserror::Error;

/// Errors that can occur during rectification.
///
/// Failures are explicit; the pipeline never substitutes a corrupt
/// still for a failed warp.
#[derive(Debug, Clone, Error)]
pub enum RectifyError {
    /// The quad cannot anchor a perspective transform.
    #[error("quadrilateral corners are collinear or coincident")]
    DegenerateQuad,
    /// The computed output extent rounded to zero pixels.
    #[error("warped extent collapsed to an empty image")]
    EmptyOutput,
}

/// A flattened, perspective-corrected still image.
///
/// Immutable once produced; replaced wholesale on each capture cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct RectifiedImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl RectifiedImage {
    /// Returns the pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the image width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the image height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Consumes the image, returning the raw pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for RectifiedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RectifiedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

/// Flattens detected quadrilaterals into upright stills.
#[derive(Debug, Clone, Default)]
pub struct Rectifier;

impl Rectifier {
    /// Creates a rectifier.
    pub fn new() -> Self {
        Self
    }

    /// Rectifies the quad's content out of the frame.
    ///
    /// The output extent is the warped quad's own extent (longest of
    /// each pair of opposite edges), not the frame's.
    pub fn rectify(&self, frame: &Frame, quad: &Quad) -> Result<RectifiedImage, RectifyError> {
        if quad.is_degenerate() {
            return Err(RectifyError::DegenerateQuad);
        }

        let fw = f64::from(frame.width());
        let fh = f64::from(frame.height());

        // Normalized bottom-left-origin corners into top-left-origin
        // pixel space.
        let to_pixels = |p: crate::detect::Point| (p.x * fw, (1.0 - p.y) * fh);
        let corners = [
            to_pixels(quad.top_left),
            to_pixels(quad.top_right),
            to_pixels(quad.bottom_right),
            to_pixels(quad.bottom_left),
        ];

        let top = edge(corners[0], corners[1]);
        let bottom = edge(corners[3], corners[2]);
        let left = edge(corners[0], corners[3]);
        let right = edge(corners[1], corners[2]);

        let out_width = top.max(bottom).round() as u32;
        let out_height = left.max(right).round() as u32;
        if out_width == 0 || out_height == 0 {
            return Err(RectifyError::EmptyOutput);
        }

        let m = unit_square_to_quad(&corners).ok_or(RectifyError::DegenerateQuad)?;

        let channels = frame.format().bytes_per_pixel();
        let src = frame.pixels();
        let sw = frame.width() as usize;
        let sh = frame.height() as usize;

        let mut pixels = Vec::with_capacity((out_width * out_height) as usize * channels);
        for i in 0..out_height {
            let v = if out_height == 1 {
                0.0
            } else {
                f64::from(i) / f64::from(out_height - 1)
            };
            for j in 0..out_width {
                let u = if out_width == 1 {
                    0.0
                } else {
                    f64::from(j) / f64::from(out_width - 1)
                };
                let (x, y) = apply(&m, u, v).ok_or(RectifyError::DegenerateQuad)?;
                for c in 0..channels {
                    pixels.push(sample_bilinear(src, sw, sh, channels, c, x, y));
                }
            }
        }

        Ok(RectifiedImage {
            pixels,
            width: out_width,
            height: out_height,
            format: frame.format(),
        })
    }
}

fn edge(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
