//! Receipt image normalization
//!
//! Turns a receipt photograph into a clean raster for OCR through a fixed,
//! profile-selected sequence of pure image-to-image steps.

pub mod config;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod steps;

pub use config::{ConfigOverrides, PipelineConfig};
pub use output::Destination;
pub use pipeline::{Pipeline, PipelineResult, PreprocessingResult, Profile, Stage, StepTiming};
pub use source::Source;
pub use steps::deskew::SkewEstimate;
