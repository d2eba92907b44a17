use crate::error::NormalizeError;
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Bytes {
        data: Vec<u8>,
        /// Used only for error messages and logging
        name: Option<String>,
    },
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            data: data.into(),
            name: None,
        }
    }

    /// Human-readable identifier for logs and errors
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name: Some(name), .. } => name.clone(),
            Self::Bytes { data, name: None } => format!("<{} bytes>", data.len()),
        }
    }

    /// Decode the source and convert it to a single-channel raster
    pub fn load(&self) -> Result<GrayImage, NormalizeError> {
        let decoded = match self {
            Self::Path(path) => open_path(path)?,
            Self::Bytes { data, .. } => {
                image::load_from_memory(data).map_err(|e| self.unreadable(e.to_string()))?
            }
        };

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(self.unreadable("image has no pixels".to_string()));
        }

        tracing::debug!(
            "Loaded {} ({}x{}, {:?})",
            self.describe(),
            decoded.width(),
            decoded.height(),
            decoded.color()
        );

        Ok(to_grayscale(decoded))
    }

    fn unreadable(&self, reason: String) -> NormalizeError {
        NormalizeError::UnreadableImage {
            origin: self.describe(),
            reason,
        }
    }
}

fn open_path(path: &Path) -> Result<DynamicImage, NormalizeError> {
    image::open(path).map_err(|e| NormalizeError::UnreadableImage {
        origin: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Luma-weighted grayscale; already-gray images are unwrapped without copying
pub fn to_grayscale(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    }
}
