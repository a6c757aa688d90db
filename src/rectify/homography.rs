//! Perspective transform between the unit square and a quadrilateral.

/// 3x3 row-major homography mapping the unit square onto a
/// quadrilateral: `(0,0)` to the first corner, `(1,0)` to the second,
/// `(1,1)` to the third, `(0,1)` to the fourth.
///
/// Returns `None` when the corners admit no invertible transform
/// (collinear or coincident points).
pub fn unit_square_to_quad(corners: &[(f64, f64); 4]) -> Option<[f64; 9]> {
    let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] = *corners;

    let px = x0 - x1 + x2 - x3;
    let py = y0 - y1 + y2 - y3;

    let m = if px.abs() < 1e-12 && py.abs() < 1e-12 {
        // Parallelogram: affine case.
        [x1 - x0, x3 - x0, x0, y1 - y0, y3 - y0, y0, 0.0, 0.0, 1.0]
    } else {
        let dx1 = x1 - x2;
        let dx2 = x3 - x2;
        let dy1 = y1 - y2;
        let dy2 = y3 - y2;
        let den = dx1 * dy2 - dx2 * dy1;
        if den.abs() < 1e-12 {
            return None;
        }
        let g = (px * dy2 - dx2 * py) / den;
        let h = (dx1 * py - px * dy1) / den;
        [
            x1 - x0 + g * x1,
            x3 - x0 + h * x3,
            x0,
            y1 - y0 + g * y1,
            y3 - y0 + h * y3,
            y0,
            g,
            h,
            1.0,
        ]
    };

    if m.iter().all(|v| v.is_finite()) {
        Some(m)
    } else {
        None
    }
}

/// Applies a homography to a point.
///
/// Returns `None` if the point maps to infinity.
pub fn apply(m: &[f64; 9], u: f64, v: f64) -> Option<(f64, f64)> {
    let w = m[6] * u + m[7] * v + m[8];
    if w.abs() < 1e-12 {
        return None;
    }
    let x = (m[0] * u + m[1] * v + m[2]) / w;
    let y = (m[3] * u + m[4] * v + m[5]) / w;
    if x.is_finite() && y.is_finite() {
        Some((x, y))
    } else {
        None
    }
}

/// Samples one channel of an interleaved pixel buffer with bilinear
/// interpolation, clamping to the image edge.
pub fn sample_bilinear(
    pixels: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    channel: usize,
    x: f64,
    y: f64,
) -> u8 {
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let px = |xx: usize, yy: usize| f64::from(pixels[(yy * width + xx) * channels + channel]);

    let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
    let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_on_unit_square() {
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let m = unit_square_to_quad(&corners).unwrap();

        for &(u, v) in &[(0.0, 0.0), (1.0, 0.0), (0.5, 0.5), (1.0, 1.0)] {
            let (x, y) = apply(&m, u, v).unwrap();
            assert!((x - u).abs() < 1e-9);
            assert!((y - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_maps_corners_of_skewed_quad() {
        let corners = [(10.0, 20.0), (90.0, 10.0), (100.0, 95.0), (5.0, 80.0)];
        let m = unit_square_to_quad(&corners).unwrap();

        let targets = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        for (i, &(u, v)) in targets.iter().enumerate() {
            let (x, y) = apply(&m, u, v).unwrap();
            assert!((x - corners[i].0).abs() < 1e-6);
            assert!((y - corners[i].1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_collinear_corners_rejected() {
        let corners = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert!(unit_square_to_quad(&corners).is_none());
    }

    #[test]
    fn test_bilinear_interpolates_midpoint() {
        // 2x1 image, values 0 and 100.
        let pixels = [0u8, 100u8];
        let v = sample_bilinear(&pixels, 2, 1, 1, 0, 0.5, 0.0);
        assert_eq!(v, 50);
    }
}
