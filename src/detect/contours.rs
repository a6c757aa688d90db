//! Binarization, boundary tracing, and polygon simplification.
//!
//! These are the raw ingredients of the rectangle oracle: an Otsu
//! split into foreground/background, Moore-neighbor tracing of region
//! boundaries, and Douglas-Peucker reduction of a traced boundary to
//! its dominant vertices.

/// Computes the Otsu threshold of a grayscale buffer.
///
/// Maximizes between-class variance over the histogram. A uniform
/// image has no meaningful split and yields threshold 0.
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    let mut hist = [0u32; 256];
    for &px in gray {
        hist[px as usize] += 1;
    }

    let total = gray.len() as f64;
    let sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &n)| (i as f64) * f64::from(n))
        .sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut best = 0.0;
    let mut threshold = 0u8;

    for i in 0..256 {
        weight_b += f64::from(hist[i]);
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }
        sum_b += (i as f64) * f64::from(hist[i]);

        let mean_diff = sum_b / weight_b - (sum - sum_b) / weight_f;
        let between = weight_b * weight_f * mean_diff * mean_diff;
        if between > best {
            best = between;
            threshold = i as u8;
        }
    }
    threshold
}

/// Produces a 0/1 mask from a grayscale buffer.
///
/// With `dark_foreground` the pixels at or below the threshold become
/// foreground; otherwise the pixels above it do. The strip may be
/// darker or lighter than its background, so the detector runs both
/// polarities.
pub fn binarize(gray: &[u8], threshold: u8, dark_foreground: bool) -> Vec<u8> {
    gray.iter()
        .map(|&px| {
            let dark = px <= threshold;
            u8::from(dark == dark_foreground)
        })
        .collect()
}

/// Clockwise Moore neighborhood, starting west.
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

#[inline]
fn at(mask: &[u8], width: i32, height: i32, x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && x < width && y < height && mask[(y * width + x) as usize] != 0
}

/// Traces all region boundaries in a 0/1 mask.
///
/// Returns one clockwise pixel chain per boundary. Chains shorter than
/// four pixels are discarded; they cannot form a quadrilateral.
pub fn find_contours(mask: &[u8], width: u32, height: u32) -> Vec<Vec<(i32, i32)>> {
    let w = width as i32;
    let h = height as i32;
    let mut traced = vec![false; mask.len()];
    let mut contours = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            // Start at a foreground pixel entered from the background
            // on its west side, once per boundary.
            if mask[idx] == 0 || traced[idx] || at(mask, w, h, x - 1, y) {
                continue;
            }
            let contour = trace_boundary(mask, w, h, x, y, &mut traced);
            if contour.len() >= 4 {
                contours.push(contour);
            }
        }
    }
    contours
}

/// Moore-neighbor boundary trace from a start pixel whose west
/// neighbor is background.
fn trace_boundary(
    mask: &[u8],
    w: i32,
    h: i32,
    sx: i32,
    sy: i32,
    traced: &mut [bool],
) -> Vec<(i32, i32)> {
    let start = (sx, sy);
    let mut contour = vec![start];
    traced[(sy * w + sx) as usize] = true;

    let mut cur = start;
    // Entered from the west.
    let mut backtrack = 0usize;
    let cap = (mask.len() * 8).max(64);

    for _ in 0..cap {
        let mut advanced = false;
        for step in 0..8 {
            let dir = (backtrack + 1 + step) % 8;
            let (dx, dy) = NEIGHBORS[dir];
            let nx = cur.0 + dx;
            let ny = cur.1 + dy;
            if !at(mask, w, h, nx, ny) {
                continue;
            }
            if (nx, ny) == start && contour.len() >= 2 {
                return contour;
            }
            contour.push((nx, ny));
            traced[(ny * w + nx) as usize] = true;
            cur = (nx, ny);
            backtrack = (dir + 4) % 8;
            advanced = true;
            break;
        }
        if !advanced {
            // Isolated pixel.
            return contour;
        }
    }
    contour
}

/// Perimeter length of a closed pixel chain.
pub fn perimeter(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        total += ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    }
    total
}

fn perpendicular_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    ((p.1 - a.1) * dx - (p.0 - a.0) * dy).abs() / len_sq.sqrt()
}

fn douglas_peucker(points: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, &p) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let d = perpendicular_distance(p, first, last);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let mut left = douglas_peucker(&points[..=max_idx], epsilon);
        let right = douglas_peucker(&points[max_idx..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Reduces a closed boundary to its dominant vertices.
///
/// Splits the ring at the point farthest from the start, runs
/// Douglas-Peucker on each half, and prunes vertices that remain
/// nearly collinear with their neighbors.
pub fn simplify_closed(contour: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    if contour.len() < 4 {
        return contour.to_vec();
    }

    let anchor = contour[0];
    let split = contour
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            let da = (a.0 - anchor.0).powi(2) + (a.1 - anchor.1).powi(2);
            let db = (b.0 - anchor.0).powi(2) + (b.1 - anchor.1).powi(2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if split == 0 {
        return contour.to_vec();
    }

    let mut second_half: Vec<(f64, f64)> = contour[split..].to_vec();
    second_half.push(contour[0]);

    let mut poly = douglas_peucker(&contour[..=split], epsilon);
    let tail = douglas_peucker(&second_half, epsilon);
    // Shared endpoints: drop the duplicated split point and the
    // duplicated ring start.
    poly.pop();
    poly.extend(tail);
    poly.pop();

    prune_collinear(poly, epsilon)
}

fn prune_collinear(mut poly: Vec<(f64, f64)>, epsilon: f64) -> Vec<(f64, f64)> {
    loop {
        if poly.len() < 4 {
            return poly;
        }
        let mut removed = false;
        let mut i = 0;
        while i < poly.len() && poly.len() > 3 {
            let prev = poly[(i + poly.len() - 1) % poly.len()];
            let next = poly[(i + 1) % poly.len()];
            if perpendicular_distance(poly[i], prev, next) <= epsilon {
                poly.remove(i);
                removed = true;
            } else {
                i += 1;
            }
        }
        if !removed {
            return poly;
        }
    }
}

/// Tests whether a polygon is strictly convex.
///
/// Consecutive edge cross products must all share one sign.
pub fn is_convex(poly: &[(f64, f64)]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
