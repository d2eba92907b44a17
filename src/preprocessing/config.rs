//! Pipeline tunables and their validation

use crate::error::NormalizeError;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Kernel sizes above this risk fusing adjacent characters and erasing
/// strokes thinner than the kernel.
const MORPH_KERNEL_CAUTION: u32 = 3;

/// Edge-aware denoising strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenoiseMethod {
    /// Patch-based non-local means (strong, slower)
    NonLocalMeans,
    /// 3x3 median filter (salt-and-pepper only)
    Median,
}

/// Interpolation used when enlarging small images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    CatmullRom,
    Lanczos3,
}

impl ResampleFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// 3x3 high-pass kernels. Every variant sums to 1 so overall brightness is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharpenKernel {
    /// Center 5, 4-neighbours -1
    Cross,
    /// Center 9, 8-neighbours -1
    Box,
    /// Sharpness factor: blend between a smoothed image (0.0), the original
    /// (1.0) and beyond
    Enhance(f32),
}

impl SharpenKernel {
    pub fn weights(self) -> [f32; 9] {
        match self {
            Self::Cross => [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
            Self::Box => [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0],
            Self::Enhance(factor) => {
                // Smoothing kernel is [1 1 1; 1 5 1; 1 1 1] / 13
                let ring = (1.0 - factor) / 13.0;
                let center = factor + (1.0 - factor) * 5.0 / 13.0;
                [ring, ring, ring, ring, center, ring, ring, ring, ring]
            }
        }
    }
}

/// Contrast boost applied by the tone stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContrastFactor {
    /// Pick a factor from the measured mean brightness
    Auto,
    Fixed(f32),
}

impl ContrastFactor {
    /// Darker images get a stronger boost.
    pub fn resolve(self, mean_brightness: f32) -> f32 {
        match self {
            Self::Fixed(factor) => factor,
            Self::Auto if mean_brightness < 100.0 => 2.5,
            Self::Auto if mean_brightness > 180.0 => 1.8,
            Self::Auto => 2.2,
        }
    }
}

/// Tunables for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub denoise_method: DenoiseMethod,
    /// Non-local means filter strength (`h`)
    pub denoise_strength: f32,
    pub target_min_dimension: u32,
    pub resample_filter: ResampleFilter,
    pub skew_threshold_degrees: f32,
    /// Half-size of the window used to estimate the paper brightness; must
    /// exceed half the thickest stroke
    pub background_radius: u32,
    pub adaptive_threshold_block_size: u32,
    pub adaptive_threshold_c: i32,
    pub morph_kernel_size: u32,
    pub sharpen_kernel: SharpenKernel,
    pub contrast_factor: ContrastFactor,
    pub brightness_factor: f32,
    /// Percent of pixels discarded at each end of the histogram
    pub autocontrast_cutoff: f32,
    pub unsharp_sigma: f32,
    /// Fraction of the high-pass detail added back (1.2 = 120%)
    pub unsharp_amount: f32,
    pub unsharp_threshold: i32,
    pub output_suffix: String,
    /// Overrides the input's extension when set
    pub output_extension: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            denoise_method: DenoiseMethod::NonLocalMeans,
            denoise_strength: 10.0,
            target_min_dimension: 800,
            resample_filter: ResampleFilter::CatmullRom,
            skew_threshold_degrees: 0.5,
            background_radius: 15,
            adaptive_threshold_block_size: 11,
            adaptive_threshold_c: 2,
            morph_kernel_size: 2,
            sharpen_kernel: SharpenKernel::Box,
            contrast_factor: ContrastFactor::Auto,
            brightness_factor: 1.0,
            autocontrast_cutoff: 2.0,
            unsharp_sigma: 1.5,
            unsharp_amount: 1.2,
            unsharp_threshold: 2,
            output_suffix: "_enhanced".to_string(),
            output_extension: None,
        }
    }
}

impl PipelineConfig {
    /// Reject out-of-range tunables before any stage runs
    pub fn validate(&self) -> Result<(), NormalizeError> {
        let invalid = |msg: String| Err(NormalizeError::InvalidConfig(msg));

        if !(self.denoise_strength.is_finite() && self.denoise_strength > 0.0) {
            return invalid(format!(
                "denoise_strength must be positive, got {}",
                self.denoise_strength
            ));
        }
        if self.target_min_dimension == 0 {
            return invalid("target_min_dimension must be greater than 0".to_string());
        }
        if !(self.skew_threshold_degrees.is_finite() && self.skew_threshold_degrees >= 0.0) {
            return invalid(format!(
                "skew_threshold_degrees must be non-negative, got {}",
                self.skew_threshold_degrees
            ));
        }
        if self.background_radius == 0 {
            return invalid("background_radius must be greater than 0".to_string());
        }
        validate_block_size(self.adaptive_threshold_block_size)?;
        if self.morph_kernel_size == 0 || self.morph_kernel_size > u8::MAX as u32 {
            return invalid(format!(
                "morph_kernel_size must be between 1 and 255, got {}",
                self.morph_kernel_size
            ));
        }
        if self.morph_kernel_size > MORPH_KERNEL_CAUTION {
            tracing::warn!(
                "morph_kernel_size {} may fuse adjacent characters and erases dark strokes thinner than {} px",
                self.morph_kernel_size,
                self.morph_kernel_size
            );
        }
        if let SharpenKernel::Enhance(factor) = self.sharpen_kernel {
            if !factor.is_finite() {
                return invalid(format!("sharpness factor must be finite, got {}", factor));
            }
        }
        if let ContrastFactor::Fixed(factor) = self.contrast_factor {
            if !(factor.is_finite() && factor >= 0.0) {
                return invalid(format!("contrast_factor must be non-negative, got {}", factor));
            }
        }
        if !(self.brightness_factor.is_finite() && self.brightness_factor >= 0.0) {
            return invalid(format!(
                "brightness_factor must be non-negative, got {}",
                self.brightness_factor
            ));
        }
        if !(0.0..50.0).contains(&self.autocontrast_cutoff) {
            return invalid(format!(
                "autocontrast_cutoff must be in [0, 50), got {}",
                self.autocontrast_cutoff
            ));
        }
        if !(self.unsharp_sigma.is_finite() && self.unsharp_sigma > 0.0) {
            return invalid(format!(
                "unsharp_sigma must be positive, got {}",
                self.unsharp_sigma
            ));
        }
        if !(self.unsharp_amount.is_finite() && self.unsharp_amount >= 0.0) {
            return invalid(format!(
                "unsharp_amount must be non-negative, got {}",
                self.unsharp_amount
            ));
        }
        if let Some(ext) = &self.output_extension {
            if image::ImageFormat::from_extension(ext.trim_start_matches('.')).is_none() {
                return invalid(format!("unsupported output extension '{}'", ext));
            }
        }

        Ok(())
    }
}

/// Adaptive threshold windows must be odd and larger than one pixel.
pub fn validate_block_size(block_size: u32) -> Result<(), NormalizeError> {
    if block_size <= 1 || block_size % 2 == 0 {
        return Err(NormalizeError::InvalidConfig(format!(
            "adaptive_threshold_block_size must be odd and greater than 1, got {}",
            block_size
        )));
    }
    Ok(())
}

/// Partial configuration layered over a profile's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub denoise_method: Option<DenoiseMethod>,
    pub denoise_strength: Option<f32>,
    pub target_min_dimension: Option<u32>,
    pub resample_filter: Option<ResampleFilter>,
    pub skew_threshold_degrees: Option<f32>,
    pub background_radius: Option<u32>,
    pub adaptive_threshold_block_size: Option<u32>,
    pub adaptive_threshold_c: Option<i32>,
    pub morph_kernel_size: Option<u32>,
    pub sharpen_kernel: Option<SharpenKernel>,
    pub contrast_factor: Option<ContrastFactor>,
    pub brightness_factor: Option<f32>,
    pub autocontrast_cutoff: Option<f32>,
    pub unsharp_sigma: Option<f32>,
    pub unsharp_amount: Option<f32>,
    pub unsharp_threshold: Option<i32>,
    pub output_suffix: Option<String>,
    pub output_extension: Option<String>,
}

impl ConfigOverrides {
    pub fn from_json(json: &str) -> Result<Self, NormalizeError> {
        serde_json::from_str(json).map_err(|e| {
            NormalizeError::InvalidConfig(format!("Failed to parse config overrides: {}", e))
        })
    }

    pub fn apply(self, base: PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            denoise_method: self.denoise_method.unwrap_or(base.denoise_method),
            denoise_strength: self.denoise_strength.unwrap_or(base.denoise_strength),
            target_min_dimension: self
                .target_min_dimension
                .unwrap_or(base.target_min_dimension),
            resample_filter: self.resample_filter.unwrap_or(base.resample_filter),
            skew_threshold_degrees: self
                .skew_threshold_degrees
                .unwrap_or(base.skew_threshold_degrees),
            background_radius: self.background_radius.unwrap_or(base.background_radius),
            adaptive_threshold_block_size: self
                .adaptive_threshold_block_size
                .unwrap_or(base.adaptive_threshold_block_size),
            adaptive_threshold_c: self
                .adaptive_threshold_c
                .unwrap_or(base.adaptive_threshold_c),
            morph_kernel_size: self.morph_kernel_size.unwrap_or(base.morph_kernel_size),
            sharpen_kernel: self.sharpen_kernel.unwrap_or(base.sharpen_kernel),
            contrast_factor: self.contrast_factor.unwrap_or(base.contrast_factor),
            brightness_factor: self.brightness_factor.unwrap_or(base.brightness_factor),
            autocontrast_cutoff: self
                .autocontrast_cutoff
                .unwrap_or(base.autocontrast_cutoff),
            unsharp_sigma: self.unsharp_sigma.unwrap_or(base.unsharp_sigma),
            unsharp_amount: self.unsharp_amount.unwrap_or(base.unsharp_amount),
            unsharp_threshold: self.unsharp_threshold.unwrap_or(base.unsharp_threshold),
            output_suffix: self.output_suffix.unwrap_or(base.output_suffix),
            output_extension: self.output_extension.or(base.output_extension),
        }
    }
}
