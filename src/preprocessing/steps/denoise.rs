use crate::error::NormalizeError;
use crate::preprocessing::config::DenoiseMethod;
use image::{GrayImage, Luma};
use imageproc::filter::median_filter;

/// Half-size of the compared patches (7x7)
const TEMPLATE_RADIUS: u32 = 3;
/// Half-size of the neighbourhood searched for similar patches (11x11)
const SEARCH_RADIUS: u32 = 5;

/// Remove sensor/JPEG noise while keeping text strokes sharp
pub fn apply(
    image: GrayImage,
    method: DenoiseMethod,
    strength: f32,
) -> Result<GrayImage, NormalizeError> {
    match method {
        DenoiseMethod::NonLocalMeans => {
            if !(strength.is_finite() && strength > 0.0) {
                return Err(NormalizeError::InvalidConfig(format!(
                    "denoise_strength must be positive, got {}",
                    strength
                )));
            }
            Ok(non_local_means(&image, strength, TEMPLATE_RADIUS, SEARCH_RADIUS))
        }
        // 3x3 median filter (radius 1) - effective for salt-and-pepper noise
        DenoiseMethod::Median => Ok(median_filter(&image, 1, 1)),
    }
}

/// Non-local means denoising.
///
/// Each output pixel is a weighted average of the pixels in its search window,
/// weighted by `exp(-d² / h²)` where `d²` is the mean squared difference between
/// the patch around the pixel and the patch around the candidate. For every
/// search offset the patch distances come from running box sums of integer
/// squared differences, so the cost does not grow with the template size.
/// Borders replicate.
fn non_local_means(img: &GrayImage, h: f32, template_radius: u32, search_radius: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, hgt) = (width as usize, height as usize);
    if w == 0 || hgt == 0 {
        return img.clone();
    }
    let t = template_radius as usize;
    let s = search_radius as usize;
    let side = 2 * t + 1;
    let patch_area = (side * side) as u32;

    let pad = t + s;
    let padded = pad_replicate(img, pad);
    let pw = w + 2 * pad;
    let weights = weight_table(h);

    // Squared differences cover every pixel a patch can touch
    let dw = w + 2 * t;
    let dh = hgt + 2 * t;
    let mut squared = vec![0u32; dw];
    let mut row_sums = vec![0u32; dh * w];
    let mut column = vec![0u32; w];
    let mut weighted_sum = vec![0.0f32; w * hgt];
    let mut weight_total = vec![0.0f32; w * hgt];

    for oy in 0..=2 * s {
        for ox in 0..=2 * s {
            // row_sums[v][x] = sum of squared differences over u in x..x+side
            for v in 0..dh {
                let reference = &padded[(v + s) * pw + s..][..dw];
                let candidate = &padded[(v + oy) * pw + ox..][..dw];
                for (sq, (&a, &b)) in squared.iter_mut().zip(reference.iter().zip(candidate)) {
                    let d = a as i32 - b as i32;
                    *sq = (d * d) as u32;
                }

                let sums = &mut row_sums[v * w..(v + 1) * w];
                let mut running: u32 = squared[..side].iter().sum();
                sums[0] = running;
                for x in 1..w {
                    running = running + squared[x + side - 1] - squared[x - 1];
                    sums[x] = running;
                }
            }

            column.copy_from_slice(&row_sums[..w]);
            for v in 1..side {
                for (c, &r) in column.iter_mut().zip(&row_sums[v * w..(v + 1) * w]) {
                    *c += r;
                }
            }

            for y in 0..hgt {
                let candidates = &padded[(y + oy + t) * pw + ox + t..][..w];
                let row = y * w;
                for x in 0..w {
                    let distance = ((column[x] + patch_area / 2) / patch_area) as usize;
                    let weight = weights[distance];
                    weighted_sum[row + x] += weight * candidates[x] as f32;
                    weight_total[row + x] += weight;
                }

                if y + 1 < hgt {
                    let entering = &row_sums[(y + side) * w..(y + side + 1) * w];
                    let leaving = &row_sums[y * w..(y + 1) * w];
                    for ((c, &add), &sub) in column.iter_mut().zip(entering).zip(leaving) {
                        *c = *c + add - sub;
                    }
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        // The zero offset always contributes weight 1, so the total is never 0
        let value = weighted_sum[idx] / weight_total[idx];
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Copy of `img` with `pad` replicated pixels on every side, row-major
fn pad_replicate(img: &GrayImage, pad: usize) -> Vec<u8> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = img.as_raw();
    let pw = w + 2 * pad;
    let ph = h + 2 * pad;

    let mut padded = Vec::with_capacity(pw * ph);
    for py in 0..ph {
        let sy = py.saturating_sub(pad).min(h - 1);
        let src = &raw[sy * w..(sy + 1) * w];
        padded.extend(std::iter::repeat(src[0]).take(pad));
        padded.extend_from_slice(src);
        padded.extend(std::iter::repeat(src[w - 1]).take(pad));
    }
    padded
}

/// `exp(-d / h²)` for every mean squared difference `d` a u8 patch can have
fn weight_table(h: f32) -> Vec<f32> {
    let inv_h2 = 1.0 / (h * h);
    (0..=255u32 * 255)
        .map(|d| (-(d as f32) * inv_h2).exp())
        .collect()
}
