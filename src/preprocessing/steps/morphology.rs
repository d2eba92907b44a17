use crate::error::NormalizeError;
use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, Mask};

/// Morphological closing (dilation, then erosion) with a `k x k` square.
///
/// On a binarized receipt this fills pinholes in the white paper and removes
/// isolated black specks smaller than the element, while strokes wider than
/// the element keep their shape. Dark strokes thinner than the element are
/// erased along with the specks, so a 2x2 kernel removes 1 px hairlines.
pub fn apply(image: GrayImage, kernel_size: u32) -> Result<GrayImage, NormalizeError> {
    let size = u8::try_from(kernel_size)
        .ok()
        .filter(|k| *k > 0)
        .ok_or_else(|| {
            NormalizeError::InvalidConfig(format!(
                "morph_kernel_size must be between 1 and 255, got {}",
                kernel_size
            ))
        })?;

    if size == 1 {
        return Ok(image);
    }

    Ok(grayscale_close(&image, &square_element(size)))
}

/// Solid square anchored at (k/2, k/2)
fn square_element(size: u8) -> Mask {
    let footprint = GrayImage::from_pixel(size as u32, size as u32, Luma([255u8]));
    Mask::from_image(&footprint, size / 2, size / 2)
}
