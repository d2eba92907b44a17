use crate::error::NormalizeError;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

use super::config::{
    ConfigOverrides, ContrastFactor, DenoiseMethod, PipelineConfig, ResampleFilter, SharpenKernel,
};
use super::output::{self, Destination};
use super::source::Source;
use super::steps;

/// Named preprocessing profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Binary output for maximum OCR edge crispness
    /// Steps: denoise, rescale, deskew, flatten, binarize, close, sharpen
    #[default]
    FullOcr,
    /// Grayscale output with light, brightness-aware enhancement
    /// Steps: rescale, contrast, sharpen, denoise (median), unsharp mask, autocontrast
    MinimalGrayscale,
    /// Grayscale output with strong contrast for faded thermal paper
    /// Steps: rescale, contrast, brightness, autocontrast, sharpen
    ReceiptAggressive,
    /// Contrast boost only, size and tones otherwise kept
    ContrastOnly,
    /// Grayscale conversion only
    GrayscaleOnly,
}

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::FullOcr,
        Profile::MinimalGrayscale,
        Profile::ReceiptAggressive,
        Profile::ContrastOnly,
        Profile::GrayscaleOnly,
    ];

    /// Get the profile name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullOcr => "full-ocr",
            Self::MinimalGrayscale => "minimal-grayscale",
            Self::ReceiptAggressive => "receipt-aggressive",
            Self::ContrastOnly => "contrast-only",
            Self::GrayscaleOnly => "grayscale-only",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::FullOcr => "Denoised, deskewed, binarized and sharpened image for OCR",
            Self::MinimalGrayscale => "Brightness-aware contrast and sharpening, grayscale kept",
            Self::ReceiptAggressive => "Strong contrast and brightness boost for faded receipts",
            Self::ContrastOnly => "Fixed contrast boost around the mean, nothing else",
            Self::GrayscaleOnly => "Grayscale conversion only, written at high quality",
        }
    }

    /// Whether the final image holds only two intensity levels
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::FullOcr)
    }

    /// Fixed stage order for this profile
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::FullOcr => &[
                Stage::Denoise,
                Stage::Rescale,
                Stage::Deskew,
                Stage::Flatten,
                Stage::Binarize,
                Stage::Close,
                Stage::Sharpen,
            ],
            Self::MinimalGrayscale => &[
                Stage::Rescale,
                Stage::Contrast,
                Stage::Sharpen,
                Stage::Denoise,
                Stage::UnsharpMask,
                Stage::AutoContrast,
            ],
            Self::ReceiptAggressive => &[
                Stage::Rescale,
                Stage::Contrast,
                Stage::Brightness,
                Stage::AutoContrast,
                Stage::Sharpen,
            ],
            Self::ContrastOnly => &[Stage::Contrast],
            Self::GrayscaleOnly => &[],
        }
    }

    pub fn default_config(&self) -> PipelineConfig {
        match self {
            Self::FullOcr => PipelineConfig::default(),
            Self::MinimalGrayscale => PipelineConfig {
                denoise_method: DenoiseMethod::Median,
                target_min_dimension: 600,
                resample_filter: ResampleFilter::Lanczos3,
                sharpen_kernel: SharpenKernel::Enhance(2.0),
                contrast_factor: ContrastFactor::Auto,
                autocontrast_cutoff: 2.0,
                ..PipelineConfig::default()
            },
            Self::ReceiptAggressive => PipelineConfig {
                target_min_dimension: 800,
                resample_filter: ResampleFilter::Lanczos3,
                sharpen_kernel: SharpenKernel::Enhance(2.5),
                contrast_factor: ContrastFactor::Fixed(3.0),
                brightness_factor: 1.3,
                autocontrast_cutoff: 5.0,
                ..PipelineConfig::default()
            },
            Self::ContrastOnly => PipelineConfig {
                contrast_factor: ContrastFactor::Fixed(2.0),
                ..PipelineConfig::default()
            },
            Self::GrayscaleOnly => PipelineConfig {
                output_suffix: "_minimal".to_string(),
                ..PipelineConfig::default()
            },
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "full-ocr" | "full" => Ok(Self::FullOcr),
            "minimal-grayscale" | "minimal" => Ok(Self::MinimalGrayscale),
            "receipt-aggressive" | "aggressive" => Ok(Self::ReceiptAggressive),
            "contrast-only" | "contrast" => Ok(Self::ContrastOnly),
            "grayscale-only" | "grayscale" => Ok(Self::GrayscaleOnly),
            other => Err(format!("Unknown profile: '{other}'")),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single image-to-image transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Denoise,
    Rescale,
    Deskew,
    Flatten,
    Binarize,
    Close,
    Sharpen,
    UnsharpMask,
    Contrast,
    Brightness,
    AutoContrast,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Denoise => "denoise",
            Self::Rescale => "rescale",
            Self::Deskew => "deskew",
            Self::Flatten => "flatten",
            Self::Binarize => "binarize",
            Self::Close => "close",
            Self::Sharpen => "sharpen",
            Self::UnsharpMask => "unsharp-mask",
            Self::Contrast => "contrast",
            Self::Brightness => "brightness",
            Self::AutoContrast => "autocontrast",
        }
    }

    pub fn run(self, img: GrayImage, config: &PipelineConfig) -> Result<GrayImage, NormalizeError> {
        match self {
            Self::Denoise => {
                steps::denoise::apply(img, config.denoise_method, config.denoise_strength)
            }
            Self::Rescale => {
                steps::resize::apply(img, config.target_min_dimension, config.resample_filter)
            }
            Self::Deskew => steps::deskew::apply(
                img,
                config.skew_threshold_degrees,
                config.background_radius,
            ),
            Self::Flatten => steps::illumination::apply(img, config.background_radius),
            Self::Binarize => steps::threshold::apply(
                img,
                config.adaptive_threshold_block_size,
                config.adaptive_threshold_c,
            ),
            Self::Close => steps::morphology::apply(img, config.morph_kernel_size),
            Self::Sharpen => steps::sharpen::apply(img, config.sharpen_kernel),
            Self::UnsharpMask => steps::sharpen::unsharp_mask(
                img,
                config.unsharp_sigma,
                config.unsharp_amount,
                config.unsharp_threshold,
            ),
            Self::Contrast => steps::contrast::apply(img, config.contrast_factor),
            Self::Brightness => steps::contrast::brightness(img, config.brightness_factor),
            Self::AutoContrast => steps::contrast::autocontrast(img, config.autocontrast_cutoff),
        }
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// Preprocessed image (not serialized)
    #[serde(skip)]
    pub image: GrayImage,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Profile used
    pub profile: String,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Outcome of a full load-process-write run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    #[serde(skip)]
    pub image: GrayImage,
    #[serde(skip)]
    pub destination: Destination,
    pub profile: String,
    pub total_time_ms: u64,
    /// Includes the load and write steps
    pub steps: Vec<StepTiming>,
}

/// Preprocessing pipeline that applies the steps of one profile
#[derive(Debug, Clone)]
pub struct Pipeline {
    profile: Profile,
    config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline with the profile's own defaults
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            config: profile.default_config(),
        }
    }

    /// Pipeline with an explicit configuration, rejected if out of range
    pub fn with_config(profile: Profile, config: PipelineConfig) -> Result<Self, NormalizeError> {
        config.validate()?;
        Ok(Self { profile, config })
    }

    /// Profile defaults with some fields replaced
    pub fn with_overrides(
        profile: Profile,
        overrides: ConfigOverrides,
    ) -> Result<Self, NormalizeError> {
        Self::with_config(profile, overrides.apply(profile.default_config()))
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, process and write. Nothing is written unless every step succeeds.
    pub fn normalize(&self, source: &Source) -> Result<PipelineResult, NormalizeError> {
        self.run(source, None)
    }

    /// Like [`Pipeline::normalize`] but writes to `output` instead of a
    /// name derived from the source
    pub fn normalize_to(
        &self,
        source: &Source,
        output: &Path,
    ) -> Result<PipelineResult, NormalizeError> {
        output::format_for_path(output)?;
        self.run(source, Some(output))
    }

    fn run(&self, source: &Source, output: Option<&Path>) -> Result<PipelineResult, NormalizeError> {
        let start = Instant::now();
        let mut steps_timing = Vec::new();

        let load_start = Instant::now();
        let image = source.load()?;
        steps_timing.push(StepTiming {
            name: "load".to_string(),
            time_ms: load_start.elapsed().as_millis() as u64,
        });

        let processed = self.process(image)?;
        steps_timing.extend(processed.steps);

        let write_start = Instant::now();
        let destination = match output {
            Some(path) => output::write_to(&processed.image, path)?,
            None => output::write(&processed.image, source, &self.config)?,
        };
        steps_timing.push(StepTiming {
            name: "write".to_string(),
            time_ms: write_start.elapsed().as_millis() as u64,
        });

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Normalized {} with profile {} in {}ms -> {}",
            source.describe(),
            self.profile,
            total_time_ms,
            destination.describe()
        );

        Ok(PipelineResult {
            image: processed.image,
            destination,
            profile: self.profile.as_str().to_string(),
            total_time_ms,
            steps: steps_timing,
        })
    }

    /// Process an image according to the configured profile
    pub fn process(&self, image: GrayImage) -> Result<PreprocessingResult, NormalizeError> {
        let start = Instant::now();
        let mut steps_timing = Vec::new();

        let mut img = image;
        for stage in self.profile.stages() {
            img = self.run_step(stage.name(), img, &mut steps_timing, |img| {
                stage.run(img, &self.config)
            })?;
        }

        Ok(PreprocessingResult {
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            profile: self.profile.as_str().to_string(),
            steps: steps_timing,
        })
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: GrayImage,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<GrayImage, NormalizeError>
    where
        F: FnOnce(GrayImage) -> Result<GrayImage, NormalizeError>,
    {
        let step_start = Instant::now();
        let result = step_fn(img)?;
        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Step {} finished in {}ms ({}x{})",
            name,
            time_ms,
            result.width(),
            result.height()
        );
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms,
        });
        Ok(result)
    }
}
