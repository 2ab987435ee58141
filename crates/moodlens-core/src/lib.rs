//! moodlens-core: facial emotion classification.
//!
//! Uses SCRFD to locate a face and Emotion FER+ to classify it, both running
//! via ONNX Runtime for CPU inference. The [`adapter`] normalizes whatever the
//! classifier returns into a single [`Analysis`].

pub mod adapter;
pub mod classifier;
pub mod detector;
pub mod types;

pub use adapter::analyze;
pub use classifier::{ClassifierError, EmotionClassifier, FerPlusClassifier};
pub use detector::{DetectorError, FaceDetector};
pub use types::{
    Action, AnalyzeOptions, Analysis, BoundingBox, ClassifierOutput, Emotion, EmotionResult,
    FaceAttributes, RawAnalysis,
};

use std::path::PathBuf;

/// File name of the emotion classification model.
pub const FERPLUS_MODEL_FILE: &str = "emotion-ferplus-8.onnx";
/// File name of the face detection model.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Default model directory: `$XDG_DATA_HOME/moodlens/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodlens")
        .join("models")
}
