//! Captured image type and pixel helpers: YUYV conversion, dark detection, JPEG snapshots.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fmt;
use std::path::PathBuf;

/// Where an image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Camera { device: String },
    Upload { path: PathBuf },
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Camera { device } => write!(f, "camera {device}"),
            ImageSource::Upload { path } => write!(f, "upload {}", path.display()),
        }
    }
}

/// A decoded RGB image, alive for one processing cycle.
#[derive(Clone)]
pub struct CapturedImage {
    pub pixels: RgbImage,
    pub source: ImageSource,
    pub timestamp: std::time::Instant,
}

impl CapturedImage {
    pub fn new(pixels: RgbImage, source: ImageSource) -> Self {
        Self {
            pixels,
            source,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let n = self.pixels.pixels().len();
        if n == 0 {
            return 0.0;
        }
        self.pixels.pixels().map(|p| luma(p.0)).sum::<f32>() / n as f32
    }

    /// Encode the image as a JPEG snapshot.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&self.pixels)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// BT.601 luma of an RGB pixel.
fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}

/// Check if an image is dark: true if more than `threshold_pct` of pixels
/// have luma below 32. Empty images count as dark.
pub fn is_dark_frame(rgb: &RgbImage, threshold_pct: f32) -> bool {
    let total = rgb.pixels().len();
    if total == 0 {
        return true;
    }
    let dark = rgb.pixels().filter(|p| luma(p.0) < 32.0).count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encode failed: {0}")]
    Encode(String),
}
