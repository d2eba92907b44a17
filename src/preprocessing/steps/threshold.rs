use crate::error::NormalizeError;
use crate::preprocessing::config::validate_block_size;
use image::{GrayImage, Luma};
use imageproc::filter::separable_filter_equal;

/// Apply Gaussian adaptive thresholding
/// Better than a global threshold for receipts photographed under uneven light
pub fn apply(image: GrayImage, block_size: u32, c: i32) -> Result<GrayImage, NormalizeError> {
    validate_block_size(block_size)?;
    Ok(adaptive_gaussian_threshold(&image, block_size, c))
}

/// For each pixel, threshold = gaussian_mean(block x block) - c.
/// Pixels brighter than their threshold become white, the rest black.
fn adaptive_gaussian_threshold(img: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let kernel = gaussian_kernel(block_size);
    let local_mean = separable_filter_equal(img, &kernel);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let pixel = img.get_pixel(x, y).0[0] as i32;
        let threshold = local_mean.get_pixel(x, y).0[0] as i32 - c;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Normalized 1-D Gaussian of `size` taps.
/// Sigma follows the usual derivation from the aperture size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}
