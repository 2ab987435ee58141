//! V4L2 color camera capture via the `v4l` crate.

use crate::frame::{self, CapturedImage, ImageSource};
use image::{ImageFormat, RgbImage};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::{Capabilities, Flags};
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const MAX_VIDEO_NODES: u32 = 16;
const EBUSY: i32 = 16;
const DARK_THRESHOLD: f32 = 0.95;
/// Raw captures attempted per requested frame before giving up on dark frames.
const ATTEMPTS_PER_FRAME: usize = 3;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("cannot negotiate a pixel format: {0}")]
    Negotiation(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("only dark frames captured; is the lens covered?")]
    OnlyDarkFrames,
}

/// A V4L2 node that reports video capture capability.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    /// Card name as reported by the driver.
    pub name: String,
    pub driver: String,
    pub bus: String,
}

impl DeviceInfo {
    fn from_caps(path: &str, caps: &Capabilities) -> Self {
        Self {
            path: path.to_string(),
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        }
    }
}

/// Open `path` and confirm it can capture video.
fn open_capture_node(path: &str) -> Result<(Device, DeviceInfo), CameraError> {
    if !Path::new(path).exists() {
        return Err(CameraError::NotFound(path.to_string()));
    }

    let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
        Some(EBUSY) => CameraError::Busy(path.to_string()),
        _ => CameraError::NotFound(format!("{path}: {e}")),
    })?;
    let caps = device
        .query_caps()
        .map_err(|e| CameraError::Capture(format!("{path}: querying capabilities: {e}")))?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return Err(CameraError::NotCaptureDevice(path.to_string()));
    }

    let info = DeviceInfo::from_caps(path, &caps);
    Ok((device, info))
}

/// Frame encoding the driver agreed to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Every buffer is a standalone JPEG.
    Mjpeg,
    /// Packed YUYV 4:2:2.
    Yuyv,
    Rgb24,
}

impl PixelFormat {
    /// Formats requested in order of preference.
    const PREFERRED: [&'static [u8; 4]; 2] = [b"MJPG", b"YUYV"];

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}

/// An open color camera, ready to stream.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open the camera at `device_path` and negotiate a 640x480 color format.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        let (device, info) = open_capture_node(device_path)?;
        tracing::info!(device = device_path, card = %info.name, driver = %info.driver, "camera opened");

        let mut wanted = device
            .format()
            .map_err(|e| CameraError::Negotiation(format!("reading current format: {e}")))?;
        wanted.width = CAPTURE_WIDTH;
        wanted.height = CAPTURE_HEIGHT;

        let mut accepted = None;
        for code in PixelFormat::PREFERRED {
            wanted.fourcc = FourCC::new(code);
            let actual = device
                .set_format(&wanted)
                .map_err(|e| CameraError::Negotiation(format!("requesting {wanted}: {e}")))?;
            if let Some(pixel_format) = PixelFormat::from_fourcc(actual.fourcc) {
                accepted = Some((actual, pixel_format));
                break;
            }
        }
        let Some((format, pixel_format)) = accepted else {
            return Err(CameraError::Negotiation(
                "driver offers none of MJPG, YUYV or RGB3".to_string(),
            ));
        };

        tracing::info!(
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "capture format agreed"
        );

        Ok(Self {
            device,
            width: format.width,
            height: format.height,
            device_path: info.path,
            fourcc: format.fourcc,
            pixel_format,
        })
    }

    /// Discard `count` frames while auto exposure settles.
    pub fn warmup(&self, count: usize) -> Result<(), CameraError> {
        if count == 0 {
            return Ok(());
        }
        tracing::info!(count, "discarding warmup frames");
        let mut stream = self.stream()?;
        for _ in 0..count {
            let _ = stream.next_raw()?;
        }
        Ok(())
    }

    /// Capture one usable (non-dark) image.
    pub fn capture_image(&self) -> Result<CapturedImage, CameraError> {
        let mut stream = self.stream()?;
        for _ in 0..ATTEMPTS_PER_FRAME {
            let image = stream.next_image()?;
            if !frame::is_dark_frame(&image.pixels, DARK_THRESHOLD) {
                return Ok(image);
            }
            tracing::debug!("skipping dark frame");
        }
        Err(CameraError::OnlyDarkFrames)
    }

    /// Open a capture stream for continuous reading.
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let inner = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::Capture(format!("failed to create mmap stream: {e}")))?;
        Ok(FrameStream { camera: self, inner })
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn decode(&self, buf: &[u8]) -> Result<RgbImage, CameraError> {
        match self.pixel_format {
            PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| CameraError::Capture(format!("MJPG decode failed: {e}"))),
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::Capture(format!("YUYV conversion failed: {e}"))),
            PixelFormat::Rgb24 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::Capture(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                RgbImage::from_raw(self.width, self.height, buf[..expected].to_vec())
                    .ok_or_else(|| CameraError::Capture("RGB3 buffer rejected".into()))
            }
        }
    }

    /// Capture-capable nodes among /dev/video0 through /dev/video15.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter_map(|path| open_capture_node(&path).ok())
            .map(|(_, info)| info)
            .collect()
    }
}

/// Live capture stream borrowed from a [`Camera`].
pub struct FrameStream<'a> {
    camera: &'a Camera,
    inner: MmapStream<'a>,
}

impl FrameStream<'_> {
    fn next_raw(&mut self) -> Result<(&[u8], u32), CameraError> {
        let (buf, meta) = self
            .inner
            .next()
            .map_err(|e| CameraError::Capture(format!("failed to dequeue buffer: {e}")))?;
        Ok((buf, meta.sequence))
    }

    /// Dequeue and decode the next frame.
    pub fn next_image(&mut self) -> Result<CapturedImage, CameraError> {
        let camera = self.camera;
        let (buf, sequence) = self.next_raw()?;
        let pixels = camera.decode(buf)?;
        tracing::trace!(seq = sequence, "frame captured");
        Ok(CapturedImage::new(
            pixels,
            ImageSource::Camera {
                device: camera.device_path.clone(),
            },
        ))
    }
}
