use crate::error::NormalizeError;
use crate::preprocessing::config::ContrastFactor;
use image::{GrayImage, Luma};

/// Scale distances from the mean brightness by the (possibly auto-picked) factor
pub fn apply(image: GrayImage, factor: ContrastFactor) -> Result<GrayImage, NormalizeError> {
    let mean = mean_brightness(&image);
    let factor = factor.resolve(mean);
    tracing::debug!("Contrast factor {:.2} (mean brightness {:.1})", factor, mean);

    let pivot = mean.round();
    Ok(map_pixels(&image, |v| pivot + factor * (v - pivot)))
}

/// Multiply every pixel by `factor`
pub fn brightness(image: GrayImage, factor: f32) -> Result<GrayImage, NormalizeError> {
    if !(factor.is_finite() && factor >= 0.0) {
        return Err(NormalizeError::InvalidConfig(format!(
            "brightness_factor must be non-negative, got {}",
            factor
        )));
    }
    Ok(map_pixels(&image, |v| v * factor))
}

/// Stretch the histogram to the full 0-255 range after discarding
/// `cutoff_percent` of the pixels at each end
pub fn autocontrast(image: GrayImage, cutoff_percent: f32) -> Result<GrayImage, NormalizeError> {
    if !(0.0..50.0).contains(&cutoff_percent) {
        return Err(NormalizeError::InvalidConfig(format!(
            "autocontrast_cutoff must be in [0, 50), got {}",
            cutoff_percent
        )));
    }

    let (min_val, max_val) = cutoff_bounds(&image, cutoff_percent);

    // Avoid division by zero
    if max_val <= min_val {
        return Ok(image);
    }

    let low = min_val as f32;
    let range = (max_val - min_val) as f32;
    Ok(map_pixels(&image, |v| ((v - low) / range * 255.0).floor()))
}

pub fn mean_brightness(img: &GrayImage) -> f32 {
    let total: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    (total as f64 / count as f64) as f32
}

fn map_pixels<F>(img: &GrayImage, f: F) -> GrayImage
where
    F: Fn(f32) -> f32,
{
    // 256-entry lookup table: every pixel maps through the same function
    let lut: Vec<u8> = (0..=255u8)
        .map(|v| f(v as f32).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([lut[img.get_pixel(x, y).0[0] as usize]])
    })
}

/// Lowest and highest values left after trimming the histogram tails
fn cutoff_bounds(img: &GrayImage, cutoff_percent: f32) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cut = (total as f64 * cutoff_percent as f64 / 100.0) as u64;

    let mut low = histogram;
    let mut remaining = cut;
    for count in low.iter_mut() {
        let taken = remaining.min(*count);
        *count -= taken;
        remaining -= taken;
        if remaining == 0 {
            break;
        }
    }
    let mut remaining = cut;
    for count in low.iter_mut().rev() {
        let taken = remaining.min(*count);
        *count -= taken;
        remaining -= taken;
        if remaining == 0 {
            break;
        }
    }

    let min = low.iter().position(|&c| c > 0).unwrap_or(0);
    let max = low.iter().rposition(|&c| c > 0).unwrap_or(0);
    (min as u8, max as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_min_max(img: &GrayImage) -> (u8, u8) {
        let mut min = 255u8;
        let mut max = 0u8;

        for pixel in img.pixels() {
            let val = pixel.0[0];
            min = min.min(val);
            max = max.max(val);
        }

        (min, max)
    }

    #[test]
    fn test_autocontrast_stretches_histogram() {
        // Create a low-contrast image (values 50-200)
        let img = GrayImage::from_fn(10, 10, |x, _| {
            let val = 50 + (x as u8 * 15).min(150);
            Luma([val])
        });

        let result = autocontrast(img, 0.0).unwrap();
        let (min, max) = find_min_max(&result);

        // After normalization, min should be 0 and max should be 255
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_autocontrast_handles_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));

        let result = autocontrast(img, 2.0).unwrap();

        // Should return unchanged (no division by zero)
        assert_eq!(result.get_pixel(0, 0).0[0], 128);
    }

    #[test]
    fn test_autocontrast_ignores_outliers_within_cutoff() {
        // 98 mid-gray pixels, one black and one white outlier
        let mut img = GrayImage::from_fn(10, 10, |x, _| Luma([100 + x as u8 * 5]));
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(9, 9, Luma([255]));

        let result = autocontrast(img, 5.0).unwrap();

        // Outliers are clipped, so the mid-gray range now spans the output
        assert_eq!(result.get_pixel(0, 5).0[0], 0);
        assert_eq!(result.get_pixel(9, 5).0[0], 255);
        assert_eq!(result.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_contrast_pushes_values_away_from_mean() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([100]) } else { Luma([160]) });

        let result = apply(img, ContrastFactor::Fixed(2.0)).unwrap();

        // Mean is 130: 100 -> 70, 160 -> 190
        assert_eq!(result.get_pixel(0, 0).0[0], 70);
        assert_eq!(result.get_pixel(9, 0).0[0], 190);
    }

    #[test]
    fn test_contrast_factor_one_is_identity() {
        let img = GrayImage::from_fn(8, 8, |x, y| Luma([(x * 20 + y * 9) as u8]));
        let result = apply(img.clone(), ContrastFactor::Fixed(1.0)).unwrap();
        assert_eq!(result, img);
    }

    #[test]
    fn test_brightness_scales_and_clamps() {
        let img = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([100]) } else { Luma([220]) });
        let result = brightness(img, 1.3).unwrap();
        assert_eq!(result.get_pixel(0, 0).0[0], 130);
        assert_eq!(result.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_mean_brightness() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([(x * 40) as u8]));
        assert_eq!(mean_brightness(&img), 60.0);
    }
}
