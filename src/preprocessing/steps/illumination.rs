use crate::error::NormalizeError;
use image::{GrayImage, Luma};
use std::collections::VecDeque;

/// Normalized values at or above this are snapped to white paper
pub const PAPER_LEVEL: u8 = 224;

/// Divide out uneven lighting so the paper reads 255 everywhere.
///
/// The paper brightness is estimated with a grayscale closing over a
/// `(2r + 1)` square, which erases ink narrower than the window and keeps
/// lighting edges (shadows, hard steps) where they are.
pub fn apply(image: GrayImage, radius: u32) -> Result<GrayImage, NormalizeError> {
    if radius == 0 {
        return Err(NormalizeError::InvalidConfig(
            "background_radius must be greater than 0".to_string(),
        ));
    }
    Ok(flatten(&image, radius))
}

pub fn flatten(img: &GrayImage, radius: u32) -> GrayImage {
    let paper = background(img, radius);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y).0[0] as u32;
        // Closing never darkens, so background >= value
        let local = paper.get_pixel(x, y).0[0] as u32;
        if local == 0 {
            return Luma([255]);
        }
        let normalized = ((value * 255 + local / 2) / local).min(255) as u8;
        if normalized >= PAPER_LEVEL {
            Luma([255])
        } else {
            Luma([normalized])
        }
    })
}

/// Grayscale closing with a square window; edges replicate
pub fn background(img: &GrayImage, radius: u32) -> GrayImage {
    let dilated = square_extreme(img, radius as usize, Extreme::Max);
    square_extreme(&dilated, radius as usize, Extreme::Min)
}

#[derive(Clone, Copy)]
enum Extreme {
    Max,
    Min,
}

impl Extreme {
    fn dominates(self, a: u8, b: u8) -> bool {
        match self {
            Self::Max => a >= b,
            Self::Min => a <= b,
        }
    }
}

/// Square max/min filter as a row pass followed by a column pass
fn square_extreme(img: &GrayImage, radius: usize, extreme: Extreme) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }
    let raw = img.as_raw();

    let mut rows = vec![0u8; w * h];
    for y in 0..h {
        sliding_extreme(
            &raw[y * w..(y + 1) * w],
            radius,
            extreme,
            &mut rows[y * w..(y + 1) * w],
        );
    }

    let mut column = vec![0u8; h];
    let mut filtered = vec![0u8; h];
    let mut out = vec![0u8; w * h];
    for x in 0..w {
        for y in 0..h {
            column[y] = rows[y * w + x];
        }
        sliding_extreme(&column, radius, extreme, &mut filtered);
        for y in 0..h {
            out[y * w + x] = filtered[y];
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        Luma([out[y as usize * w + x as usize]])
    })
}

/// Extreme of `line[i - radius ..= i + radius]` (clipped to the line) for every
/// `i`, using a monotonic queue of candidate indices.
fn sliding_extreme(line: &[u8], radius: usize, extreme: Extreme, out: &mut [u8]) {
    let n = line.len();
    let mut window: VecDeque<usize> = VecDeque::with_capacity(2 * radius + 1);
    let mut next = 0;

    for (i, slot) in out.iter_mut().enumerate().take(n) {
        let hi = (i + radius).min(n - 1);
        while next <= hi {
            while let Some(&back) = window.back() {
                if extreme.dominates(line[next], line[back]) {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next);
            next += 1;
        }

        let lo = i.saturating_sub(radius);
        while let Some(&front) = window.front() {
            if front < lo {
                window.pop_front();
            } else {
                break;
            }
        }

        if let Some(&best) = window.front() {
            *slot = line[best];
        }
    }
}
