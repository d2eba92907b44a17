use super::illumination;
use crate::error::NormalizeError;
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// Bicubic coefficient (matches the common "cubic" resampler)
const CUBIC_A: f32 = -0.75;

/// Skew of the text block, in degrees.
///
/// Canonical range is (-45, 45]. A positive angle means the content must be
/// rotated clockwise to become level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewEstimate {
    pub angle_degrees: f32,
}

impl SkewEstimate {
    /// Rotation is skipped at or below the threshold
    pub fn needs_correction(&self, threshold_degrees: f32) -> bool {
        self.angle_degrees.abs() > threshold_degrees
    }
}

/// Deskew image by measuring the orientation of the inked area and rotating
/// it level. Blank images and small angles pass through untouched.
pub fn apply(
    image: GrayImage,
    threshold_degrees: f32,
    background_radius: u32,
) -> Result<GrayImage, NormalizeError> {
    let Some(estimate) = estimate_skew(&image, background_radius) else {
        tracing::debug!("Deskew skipped: no foreground pixels");
        return Ok(image);
    };

    if !estimate.needs_correction(threshold_degrees) {
        tracing::debug!(
            "Deskew skipped: {:.2} degrees is within threshold {:.2}",
            estimate.angle_degrees,
            threshold_degrees
        );
        return Ok(image);
    }

    tracing::debug!("Correcting skew of {:.2} degrees", estimate.angle_degrees);
    Ok(rotate_replicate(&image, estimate.angle_degrees))
}

/// Estimate skew from the minimum-area rectangle around the foreground.
///
/// Lighting is flattened first (see [`illumination::flatten`]), so a shadow
/// or a brightness step across the paper is never mistaken for ink.
/// Foreground is then everything at or below the Otsu level of the flattened
/// image. Returns `None` when there is no foreground at all.
pub fn estimate_skew(img: &GrayImage, background_radius: u32) -> Option<SkewEstimate> {
    let flattened = illumination::flatten(img, background_radius.max(1));
    let level = otsu_level(&flattened).min(illumination::PAPER_LEVEL - 1);
    let points = foreground_extremes(&flattened, level);
    if points.is_empty() {
        return None;
    }

    let hull = convex_hull(points.as_slice());
    let raw = min_area_rect_angle(&hull);

    Some(SkewEstimate {
        angle_degrees: normalize_angle(raw),
    })
}

/// Fold a rectangle angle in [-90, 0) into (-45, 45], flipping the sign so
/// the result is the clockwise correction.
pub fn normalize_angle(raw_degrees: f32) -> f32 {
    if raw_degrees < -45.0 {
        -(90.0 + raw_degrees)
    } else {
        -raw_degrees
    }
}

/// Leftmost and rightmost foreground pixel of each row.
///
/// Every vertex of the convex hull is extreme within its row, so these points
/// have the same hull as the full foreground set.
fn foreground_extremes(img: &GrayImage, level: u8) -> Vec<Point<i32>> {
    let (width, height) = img.dimensions();
    let mut points = Vec::new();

    for y in 0..height {
        let is_ink = |x: &u32| img.get_pixel(*x, y).0[0] <= level;
        let Some(first) = (0..width).find(is_ink) else {
            continue;
        };
        // A row with ink always has a last ink pixel
        let last = (0..width).rev().find(is_ink).unwrap_or(first);

        points.push(Point::new(first as i32, y as i32));
        if last != first {
            points.push(Point::new(last as i32, y as i32));
        }
    }

    points
}

/// Orientation of the minimum-area bounding rectangle of a convex polygon,
/// expressed in [-90, 0) degrees (image coordinates, y down).
///
/// One side of the optimal rectangle is collinear with a hull edge, so only
/// the hull edge directions need to be tried.
fn min_area_rect_angle(hull: &[Point<i32>]) -> f32 {
    let mut best_area = f64::INFINITY;
    let mut best_angle = 0.0f64;

    for (i, start) in hull.iter().enumerate() {
        let end = hull[(i + 1) % hull.len()];
        let (dx, dy) = ((end.x - start.x) as f64, (end.y - start.y) as f64);
        let length = dx.hypot(dy);
        if length == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / length, dy / length);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in hull {
            let (px, py) = (p.x as f64, p.y as f64);
            let u = px * ux + py * uy;
            let v = -px * uy + py * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            best_angle = dy.atan2(dx).to_degrees();
        }
    }

    (best_angle.rem_euclid(90.0) - 90.0) as f32
}

/// Rotate clockwise by `angle_degrees` about the image center, keeping the
/// original size. Bicubic sampling; pixels mapped from outside the image
/// replicate the nearest edge pixel.
pub fn rotate_replicate(img: &GrayImage, angle_degrees: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let src_x = cos_a * dx + sin_a * dy + cx;
        let src_y = -sin_a * dx + cos_a * dy + cy;
        Luma([sample_bicubic(img, src_x, src_y)])
    })
}

fn sample_bicubic(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (width, height) = img.dimensions();
    let clamp_x = |v: i64| v.clamp(0, width as i64 - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, height as i64 - 1) as u32;

    let x0 = x.floor();
    let y0 = y.floor();
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut value = 0.0f32;
    for (j, wyj) in wy.iter().enumerate() {
        let sy = clamp_y(y0 - 1 + j as i64);
        let mut row = 0.0f32;
        for (i, wxi) in wx.iter().enumerate() {
            let sx = clamp_x(x0 - 1 + i as i64);
            row += wxi * img.get_pixel(sx, sy).0[0] as f32;
        }
        value += wyj * row;
    }

    value.round().clamp(0.0, 255.0) as u8
}

/// Weights for the four taps at offsets -1, 0, 1, 2 from the floor sample
fn cubic_weights(t: f32) -> [f32; 4] {
    let a = CUBIC_A;
    let near = |d: f32| ((a + 2.0) * d - (a + 3.0)) * d * d + 1.0;
    let far = |d: f32| ((a * d - 5.0 * a) * d + 8.0 * a) * d - 4.0 * a;
    [far(1.0 + t), near(t), near(1.0 - t), far(2.0 - t)]
}
