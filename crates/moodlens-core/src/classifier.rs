//! Emotion FER+ classifier via ONNX Runtime.
//!
//! Classifies a 64x64 grayscale face crop into eight categories. When a
//! [`FaceDetector`] is attached, the best face is cropped first; otherwise,
//! or when no face is found in permissive mode, the whole image is used.

use crate::detector::{DetectorError, FaceDetector};
use crate::types::{Action, AnalyzeOptions, BoundingBox, ClassifierOutput, RawAnalysis};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;
/// Output order of the FER+ model head.
const FERPLUS_LABELS: [&str; 8] = [
    "neutral", "happiness", "surprise", "sadness", "anger", "disgust", "fear", "contempt",
];
/// Margin added around a detected face before cropping, as a fraction of its size.
const FACE_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; download emotion-ferplus-8.onnx into the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face could not be detected; retry with enforce_detection disabled")]
    NoFaceDetected,
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that can turn an image into classifier records.
pub trait EmotionClassifier {
    fn classify(
        &mut self,
        image: &RgbImage,
        options: &AnalyzeOptions,
    ) -> Result<ClassifierOutput, ClassifierError>;

    /// Classifier name for logging.
    fn name(&self) -> &str;
}

/// FER+ emotion classifier with an optional face locator.
pub struct FerPlusClassifier {
    session: Session,
    detector: Option<FaceDetector>,
}

impl FerPlusClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self {
            session,
            detector: None,
        })
    }

    /// Crop faces with `detector` before classifying.
    pub fn with_detector(mut self, detector: FaceDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Pick the region to classify.
    fn locate_face(
        &mut self,
        gray: &GrayImage,
        options: &AnalyzeOptions,
    ) -> Result<(GrayImage, Option<f32>), ClassifierError> {
        let best = match self.detector.as_mut() {
            Some(detector) => detector.detect(gray)?.into_iter().next(),
            None => None,
        };
        let cropped = best.and_then(|face| crop_face(gray, &face).map(|crop| (crop, face)));

        match cropped {
            Some((crop, face)) => {
                tracing::debug!(confidence = face.confidence, x = face.x, y = face.y, "face located");
                Ok((crop, Some(face.confidence)))
            }
            None if options.enforce_detection => Err(ClassifierError::NoFaceDetected),
            None => {
                tracing::debug!("no confident face; classifying the whole image");
                Ok((gray.clone(), None))
            }
        }
    }

    /// Resize a face crop to the FER+ input. The model takes raw 0–255 values.
    fn preprocess(face: &GrayImage) -> Array4<f32> {
        let size = FERPLUS_INPUT_SIZE as usize;
        let resized = imageops::resize(face, FERPLUS_INPUT_SIZE, FERPLUS_INPUT_SIZE, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
        }
        tensor
    }
}

impl EmotionClassifier for FerPlusClassifier {
    fn classify(
        &mut self,
        image: &RgbImage,
        options: &AnalyzeOptions,
    ) -> Result<ClassifierOutput, ClassifierError> {
        if options.wants(Action::Age) || options.wants(Action::Gender) {
            tracing::debug!("FER+ does not estimate age or gender; those attributes stay empty");
        }

        let gray = imageops::grayscale(image);
        let (face, face_confidence) = self.locate_face(&gray, options)?;

        if !options.wants(Action::Emotion) {
            return Ok(ClassifierOutput::Single(RawAnalysis {
                face_confidence,
                ..Default::default()
            }));
        }

        let input = Self::preprocess(&face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion logits: {e}")))?;

        if logits.len() != FERPLUS_LABELS.len() {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} emotion logits, got {}",
                FERPLUS_LABELS.len(),
                logits.len()
            )));
        }

        Ok(ClassifierOutput::Single(record_from_logits(logits, face_confidence)))
    }

    fn name(&self) -> &str {
        "ferplus"
    }
}

/// Softmax the logits into 0–100 scores keyed by FER+ label.
fn record_from_logits(logits: &[f32], face_confidence: Option<f32>) -> RawAnalysis {
    let probs = softmax(logits);
    let emotion: BTreeMap<String, f32> = FERPLUS_LABELS
        .iter()
        .zip(probs.iter())
        .map(|(label, p)| (label.to_string(), p * 100.0))
        .collect();

    let dominant_emotion = crate::types::argmax(&emotion).map(|(label, _)| label.to_string());

    RawAnalysis {
        dominant_emotion,
        emotion,
        face_confidence,
        ..Default::default()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// Crop a square region around the face, padded by [`FACE_MARGIN`] and clamped to the frame.
/// `None` for an empty frame or a box with non-finite geometry.
fn crop_face(gray: &GrayImage, face: &BoundingBox) -> Option<GrayImage> {
    if gray.width() == 0 || gray.height() == 0 || !face.is_finite() {
        return None;
    }
    let side = face.width.max(face.height) * (1.0 + FACE_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let (w, h) = (gray.width() as f32, gray.height() as f32);
    let x0 = (cx - side / 2.0).clamp(0.0, w - 1.0);
    let y0 = (cy - side / 2.0).clamp(0.0, h - 1.0);
    let x1 = (cx + side / 2.0).clamp(x0 + 1.0, w);
    let y1 = (cy + side / 2.0).clamp(y0 + 1.0, h);

    Some(imageops::crop_imm(gray, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32).to_image())
}
