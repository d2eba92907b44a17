use crate::error::NormalizeError;
use crate::preprocessing::config::ResampleFilter;
use image::{imageops, GrayImage};

/// Enlarge images whose smaller side is below `target_min_dimension`.
///
/// The smaller side lands exactly on the target and the larger side keeps the
/// aspect ratio (rounded to the nearest pixel). Images that are already large
/// enough are returned untouched.
pub fn apply(
    image: GrayImage,
    target_min_dimension: u32,
    filter: ResampleFilter,
) -> Result<GrayImage, NormalizeError> {
    if target_min_dimension == 0 {
        return Err(NormalizeError::InvalidConfig(
            "target_min_dimension must be greater than 0".to_string(),
        ));
    }

    let Some((new_width, new_height)) = target_dimensions(image.dimensions(), target_min_dimension)
    else {
        return Ok(image);
    };

    tracing::debug!(
        "Rescaling {}x{} -> {}x{}",
        image.width(),
        image.height(),
        new_width,
        new_height
    );

    Ok(imageops::resize(&image, new_width, new_height, filter.filter_type()))
}

/// `None` when the scale factor `max(1, target / min(w, h))` is 1
fn target_dimensions((width, height): (u32, u32), target: u32) -> Option<(u32, u32)> {
    let min_dim = width.min(height);
    if min_dim >= target {
        return None;
    }

    let scale = target as f64 / min_dim as f64;
    let scale_other = |dim: u32| ((dim as f64 * scale).round() as u32).max(target);

    if width <= height {
        Some((target, scale_other(height)))
    } else {
        Some((scale_other(width), target))
    }
}
