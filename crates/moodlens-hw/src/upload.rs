//! File uploads: PNG, JPEG and GIF are accepted; GIFs yield their first frame.

use crate::frame::{CapturedImage, ImageSource};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Formats an upload may use.
pub const ACCEPTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("unsupported image format {0:?} (need PNG, JPEG or GIF)")]
    UnsupportedFormat(ImageFormat),
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// Load and decode an uploaded image file.
pub fn load_upload(path: impl AsRef<Path>) -> Result<CapturedImage, UploadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| UploadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    decode_upload(&bytes, path)
}

/// Decode upload bytes. The format is sniffed from content, falling back to the extension.
pub fn decode_upload(bytes: &[u8], path: &Path) -> Result<CapturedImage, UploadError> {
    let sniffed = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|r| r.format());
    let format = sniffed
        .or_else(|| ImageFormat::from_path(path).ok())
        .ok_or(UploadError::UnknownFormat)?;

    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(UploadError::UnsupportedFormat(format));
    }

    let pixels = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    tracing::debug!(
        path = %path.display(),
        ?format,
        width = pixels.width(),
        height = pixels.height(),
        "upload decoded"
    );

    Ok(CapturedImage::new(
        pixels,
        ImageSource::Upload {
            path: path.to_path_buf(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 200, 30])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_accepts_png_jpeg_gif() {
        for format in ACCEPTED_FORMATS {
            let img = decode_upload(&encode(format), Path::new("photo.bin")).unwrap();
            assert_eq!((img.width(), img.height()), (4, 3));
            assert!(matches!(img.source, ImageSource::Upload { .. }));
        }
    }

    #[test]
    fn test_rejects_other_formats() {
        let bmp = encode(ImageFormat::Bmp);
        assert!(matches!(
            decode_upload(&bmp, Path::new("photo.bmp")),
            Err(UploadError::UnsupportedFormat(ImageFormat::Bmp))
        ));
    }

    #[test]
    fn test_garbage_is_an_input_error() {
        assert!(decode_upload(b"not an image", Path::new("notes.txt")).is_err());
        // Extension says PNG, content disagrees.
        assert!(matches!(
            decode_upload(b"not an image", Path::new("fake.png")),
            Err(UploadError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_upload("/nonexistent/moodlens/photo.png"),
            Err(UploadError::Read { .. })
        ));
    }
}
