use crate::error::NormalizeError;
use crate::preprocessing::config::SharpenKernel;
use image::{GrayImage, Luma};
use imageproc::filter::{filter3x3, gaussian_blur_f32};

/// Apply a 3x3 high-pass kernel
/// Enhances edges to make text more distinct; kernel weights sum to 1
pub fn apply(image: GrayImage, kernel: SharpenKernel) -> Result<GrayImage, NormalizeError> {
    let weights = kernel.weights();
    let sharpened: GrayImage = filter3x3(&image, &weights);
    Ok(sharpened)
}

/// Gaussian unsharp mask.
///
/// Adds `amount` times the difference between each pixel and its blurred
/// value (1.2 adds 120%). Differences smaller than `threshold` are left alone
/// so flat paper grain is not amplified.
pub fn unsharp_mask(
    image: GrayImage,
    sigma: f32,
    amount: f32,
    threshold: i32,
) -> Result<GrayImage, NormalizeError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(NormalizeError::InvalidConfig(format!(
            "unsharp_sigma must be positive, got {}",
            sigma
        )));
    }
    if !(amount.is_finite() && amount >= 0.0) {
        return Err(NormalizeError::InvalidConfig(format!(
            "unsharp_amount must be non-negative, got {}",
            amount
        )));
    }

    let blurred = gaussian_blur_f32(&image, sigma);
    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let original = image.get_pixel(x, y).0[0] as i32;
        let diff = original - blurred.get_pixel(x, y).0[0] as i32;
        if diff.abs() < threshold {
            return Luma([original as u8]);
        }
        let value = original as f32 + amount * diff as f32;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn step_edge() -> GrayImage {
        // Left half dark, right half light
        GrayImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Luma([50])
            } else {
                Luma([200])
            }
        })
    }

    #[test]
    fn test_sharpen_enhances_edges() {
        for kernel in [SharpenKernel::Cross, SharpenKernel::Box, SharpenKernel::Enhance(2.0)] {
            let result = apply(step_edge(), kernel).unwrap();

            let edge_left = result.get_pixel(9, 5).0[0];
            let edge_right = result.get_pixel(10, 5).0[0];

            let original_diff = 200i32 - 50;
            let result_diff = (edge_right as i32 - edge_left as i32).abs();

            assert!(
                result_diff > original_diff,
                "{:?}: edge should be enhanced: {} > {}",
                kernel,
                result_diff,
                original_diff
            );
        }
    }

    #[test]
    fn test_sharpen_keeps_flat_regions() {
        let img = GrayImage::from_pixel(12, 12, Luma([137]));
        let result = apply(img.clone(), SharpenKernel::Box).unwrap();
        assert_eq!(result.get_pixel(6, 6).0[0], 137);
    }

    #[test]
    fn test_sharpen_keeps_binary_images_binary() {
        let img = GrayImage::from_fn(16, 16, |x, y| {
            if (x / 3 + y / 2) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let result = apply(img, SharpenKernel::Box).unwrap();
        assert!(result.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_unsharp_mask_enhances_edges() {
        let result = unsharp_mask(step_edge(), 1.5, 1.2, 2).unwrap();
        assert!(result.get_pixel(9, 5).0[0] < 50);
        assert!(result.get_pixel(10, 5).0[0] > 200);
        // Far from the edge nothing changes
        assert_eq!(result.get_pixel(0, 5).0[0], 50);
        assert_eq!(result.get_pixel(19, 5).0[0], 200);
    }

    #[test]
    fn test_unsharp_amount_scales_the_overshoot() {
        let none = unsharp_mask(step_edge(), 1.5, 0.0, 0).unwrap();
        assert_eq!(none, step_edge());

        let full = unsharp_mask(step_edge(), 1.5, 1.0, 2).unwrap();
        let boosted = unsharp_mask(step_edge(), 1.5, 1.2, 2).unwrap();
        assert!(boosted.get_pixel(9, 5).0[0] < full.get_pixel(9, 5).0[0]);
        assert!(boosted.get_pixel(10, 5).0[0] > full.get_pixel(10, 5).0[0]);
    }

    #[test]
    fn test_unsharp_threshold_ignores_faint_texture() {
        // One-level checkerboard grain on flat paper
        let grain = GrayImage::from_fn(16, 16, |x, y| Luma([200 + ((x + y) % 2) as u8]));
        let result = unsharp_mask(grain.clone(), 1.5, 1.2, 2).unwrap();
        assert_eq!(result, grain);
    }

    #[test]
    fn test_negative_unsharp_amount_rejected() {
        let result = unsharp_mask(step_edge(), 1.5, -1.0, 2);
        assert!(matches!(result, Err(NormalizeError::InvalidConfig(_))));
    }
}
