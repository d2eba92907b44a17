//! Receipt image normalization for OCR.
//!
//! The library exposes a single entry point, [`Pipeline::normalize`], that
//! runs a profile's fixed sequence of image-to-image steps and writes the
//! result. The `server` module wraps the same pipeline in an HTTP API.

pub mod config;
pub mod error;
pub mod preprocessing;
pub mod server;

pub use error::NormalizeError;
pub use preprocessing::{
    ConfigOverrides, Destination, Pipeline, PipelineConfig, PipelineResult, Profile, Source,
};

/// Run `profile` over `source` with an explicit configuration
pub fn normalize(
    source: &Source,
    profile: Profile,
    config: PipelineConfig,
) -> Result<PipelineResult, NormalizeError> {
    Pipeline::with_config(profile, config)?.normalize(source)
}
