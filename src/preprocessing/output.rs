use crate::error::NormalizeError;
use crate::preprocessing::config::PipelineConfig;
use crate::preprocessing::source::Source;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// JPEG quality used for every lossy write
const JPEG_QUALITY: u8 = 95;
/// Extension used when neither the input nor the config names one
const DEFAULT_EXTENSION: &str = "png";

/// Where the normalized image ended up
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    File(PathBuf),
    Buffer { format: ImageFormat, bytes: Vec<u8> },
}

impl Destination {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Buffer { format, bytes } => {
                format!("<{} {} bytes>", format.extensions_str()[0], bytes.len())
            }
        }
    }
}

/// Persist the image next to a file source, or encode it for a byte source
pub fn write(
    image: &GrayImage,
    source: &Source,
    config: &PipelineConfig,
) -> Result<Destination, NormalizeError> {
    match source {
        Source::Path(input) => {
            let dest = derive_output_path(
                input,
                &config.output_suffix,
                config.output_extension.as_deref(),
            );
            write_file(image, &dest)?;
            Ok(Destination::File(dest))
        }
        Source::Bytes { .. } => {
            let format = match config.output_extension.as_deref() {
                Some(ext) => ImageFormat::from_extension(ext.trim_start_matches('.')).ok_or_else(|| {
                    NormalizeError::InvalidConfig(format!("unsupported output extension '{}'", ext))
                })?,
                None => ImageFormat::Png,
            };
            let bytes = encode(image, format).map_err(|reason| NormalizeError::WriteFailure {
                path: PathBuf::from("<memory>"),
                reason,
            })?;
            Ok(Destination::Buffer { format, bytes })
        }
    }
}

/// Format implied by an explicit output path's extension
pub fn format_for_path(path: &Path) -> Result<ImageFormat, NormalizeError> {
    ImageFormat::from_path(path).map_err(|_| {
        NormalizeError::InvalidConfig(format!(
            "cannot infer an image format from output path {}",
            path.display()
        ))
    })
}

/// Write to an explicit path instead of a derived one
pub fn write_to(image: &GrayImage, path: &Path) -> Result<Destination, NormalizeError> {
    format_for_path(path)?;
    write_file(image, path)?;
    Ok(Destination::File(path.to_path_buf()))
}

/// `<dir>/<stem><suffix>.<ext>`, keeping the input's extension unless one is given
pub fn derive_output_path(input: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = extension
        .map(|e| e.trim_start_matches('.').to_string())
        .or_else(|| {
            input
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    input.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}

/// Encode in memory first so a failed encode never leaves a partial file
pub fn write_file(image: &GrayImage, path: &Path) -> Result<(), NormalizeError> {
    let failure = |reason: String| NormalizeError::WriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    let format = ImageFormat::from_path(path).map_err(|e| failure(e.to_string()))?;
    let bytes = encode(image, format).map_err(failure)?;
    std::fs::write(path, bytes).map_err(|e| failure(e.to_string()))?;

    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

pub fn encode(image: &GrayImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))
        }
        other => image.write_to(&mut Cursor::new(&mut bytes), other),
    };
    result.map_err(|e| e.to_string())?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_derived_name_keeps_extension() {
        let path = derive_output_path(Path::new("/tmp/receipts/rewe.jpg"), "_enhanced", None);
        assert_eq!(path, PathBuf::from("/tmp/receipts/rewe_enhanced.jpg"));
    }

    #[test]
    fn test_derived_name_with_extension_override() {
        let path = derive_output_path(Path::new("scan.jpeg"), "_enhanced", Some(".png"));
        assert_eq!(path, PathBuf::from("scan_enhanced.png"));
    }

    #[test]
    fn test_derived_name_without_extension() {
        let path = derive_output_path(Path::new("dir/receipt"), "_minimal", None);
        assert_eq!(path, PathBuf::from("dir/receipt_minimal.png"));
    }

    #[test]
    fn test_encode_png_roundtrip_dimensions() {
        let img = GrayImage::from_pixel(7, 5, Luma([90]));
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let path = Path::new("/definitely/missing/dir/out.png");
        match write_file(&img, path) {
            Err(NormalizeError::WriteFailure { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected WriteFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_path_without_known_extension_is_invalid_config() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.receipt");

        let result = write_to(&img, &path);
        assert!(matches!(result, Err(NormalizeError::InvalidConfig(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_path_is_written() {
        let img = GrayImage::from_pixel(5, 4, Luma([200]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.bmp");

        let dest = write_to(&img, &path).unwrap();
        assert_eq!(dest, Destination::File(path.clone()));
        assert_eq!(image::open(&path).unwrap().height(), 4);
    }

    #[test]
    fn test_byte_source_returns_buffer() {
        let img = GrayImage::from_pixel(3, 3, Luma([10]));
        let config = PipelineConfig {
            output_extension: Some("bmp".to_string()),
            ..Default::default()
        };
        let dest = write(&img, &Source::bytes(Vec::new()), &config).unwrap();
        match dest {
            Destination::Buffer { format, bytes } => {
                assert_eq!(format, ImageFormat::Bmp);
                assert!(!bytes.is_empty());
            }
            other => panic!("expected buffer, got {:?}", other),
        }
    }
}
