//! moodlens-hw: image acquisition.
//!
//! Provides V4L2-based color camera capture and decoding of uploaded
//! image files into a common [`CapturedImage`].

pub mod camera;
pub mod frame;
pub mod upload;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::{CapturedImage, ImageSource};
pub use upload::{load_upload, UploadError};
