//! Individual preprocessing steps

pub mod contrast;
pub mod denoise;
pub mod deskew;
pub mod illumination;
pub mod morphology;
pub mod resize;
pub mod sharpen;
pub mod threshold;
