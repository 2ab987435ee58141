use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder glyph for emotions without a mapped emoji.
pub const PLACEHOLDER_EMOJI: &str = "🤔";

/// Dominant facial emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Neutral,
    Fear,
    Disgust,
    Unknown,
}

impl Emotion {
    /// Every emotion that can carry a keyword list.
    pub const KNOWN: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Fear,
        Emotion::Disgust,
    ];

    /// Map a classifier label onto an emotion, case-insensitively.
    ///
    /// Accepts both the short DeepFace labels ("happy") and the FER+ nouns
    /// ("happiness"). Anything else is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" | "happiness" => Emotion::Happy,
            "sad" | "sadness" => Emotion::Sad,
            "angry" | "anger" => Emotion::Angry,
            "surprise" | "surprised" => Emotion::Surprise,
            "neutral" => Emotion::Neutral,
            "fear" => Emotion::Fear,
            "disgust" => Emotion::Disgust,
            _ => Emotion::Unknown,
        }
    }

    /// Capitalized display label.
    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
            Emotion::Fear => "Fear",
            Emotion::Disgust => "Disgust",
            Emotion::Unknown => "Unknown",
        }
    }

    /// Lowercase key used by keyword tables.
    pub fn key(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Unknown => "unknown",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Emotion::Happy => "😊",
            Emotion::Sad => "😢",
            Emotion::Angry => "😠",
            Emotion::Surprise => "😲",
            Emotion::Neutral => "😐",
            Emotion::Fear => "😨",
            Emotion::Disgust => "🤢",
            Emotion::Unknown => PLACEHOLDER_EMOJI,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized emotion verdict for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub dominant_emotion: Emotion,
    /// Dominant category score scaled into [0, 1].
    pub confidence: f32,
}

impl EmotionResult {
    pub fn unknown() -> Self {
        Self {
            dominant_emotion: Emotion::Unknown,
            confidence: 0.0,
        }
    }

    /// Derive the verdict from one classifier record.
    ///
    /// The dominant category is the argmax of the score map. When the map is
    /// empty the record's own `dominant_emotion` label is used with zero
    /// confidence. With neither, the result is `Unknown`.
    pub fn from_record(record: &RawAnalysis) -> Self {
        if let Some((label, score)) = argmax(&record.emotion) {
            return Self {
                dominant_emotion: Emotion::from_label(label),
                confidence: normalize_confidence(score),
            };
        }

        match record.dominant_emotion.as_deref() {
            Some(label) => Self {
                dominant_emotion: Emotion::from_label(label),
                confidence: 0.0,
            },
            None => Self::unknown(),
        }
    }

    /// Whole-percent confidence, truncated.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0) as u32
    }
}

/// Scale a raw 0–100 score into [0, 1]. Non-finite scores become 0.
pub fn normalize_confidence(raw: f32) -> f32 {
    if raw.is_finite() {
        (raw / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Highest-scoring entry of a score map, skipping non-finite scores.
pub fn argmax(scores: &BTreeMap<String, f32>) -> Option<(&str, f32)> {
    scores
        .iter()
        .filter(|(_, s)| s.is_finite())
        .fold(None, |best: Option<(&str, f32)>, (label, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((label.as_str(), score)),
        })
}

/// Attribute the classifier can report on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Emotion,
    Age,
    Gender,
}

/// Options passed to every classifier call.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub actions: Vec<Action>,
    /// When false, classify the whole image if no face is confidently found.
    pub enforce_detection: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            actions: vec![Action::Emotion],
            enforce_detection: false,
        }
    }
}

impl AnalyzeOptions {
    pub fn wants(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Gender as reported by a classifier: a plain label or per-label scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenderField {
    Label(String),
    Scores(BTreeMap<String, f32>),
}

/// One per-face record in the DeepFace-style shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub dominant_emotion: Option<String>,
    /// Per-category scores on a 0–100 scale.
    #[serde(default)]
    pub emotion: BTreeMap<String, f32>,
    #[serde(default)]
    pub age: Option<f32>,
    #[serde(default)]
    pub gender: Option<GenderField>,
    #[serde(default)]
    pub dominant_gender: Option<String>,
    #[serde(default)]
    pub face_confidence: Option<f32>,
}

/// Classifier output: one record, or one record per detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassifierOutput {
    Many(Vec<RawAnalysis>),
    Single(RawAnalysis),
}

impl ClassifierOutput {
    /// The record the rest of the pipeline works with.
    pub fn first(&self) -> Option<&RawAnalysis> {
        match self {
            ClassifierOutput::Single(record) => Some(record),
            ClassifierOutput::Many(records) => records.first(),
        }
    }
}

/// Optional face attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl FaceAttributes {
    pub fn from_record(record: &RawAnalysis) -> Self {
        let age = record
            .age
            .filter(|a| a.is_finite() && *a >= 0.0)
            .map(|a| a.round() as u32);

        let gender = match &record.gender {
            Some(GenderField::Label(label)) => Some(label.clone()),
            Some(GenderField::Scores(scores)) => argmax(scores).map(|(l, _)| l.to_string()),
            None => None,
        }
        .or_else(|| record.dominant_gender.clone());

        Self { age, gender }
    }
}

/// Everything the presentation layer needs from one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub result: EmotionResult,
    pub attributes: FaceAttributes,
    pub face_confidence: Option<f32>,
    /// Human-readable classification failure, if any.
    pub warning: Option<String>,
}

impl Analysis {
    pub fn from_record(record: &RawAnalysis) -> Self {
        Self {
            result: EmotionResult::from_record(record),
            attributes: FaceAttributes::from_record(record),
            face_confidence: record.face_confidence.filter(|c| c.is_finite()),
            warning: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: EmotionResult::unknown(),
            attributes: FaceAttributes::default(),
            face_confidence: None,
            warning: Some(message.into()),
        }
    }
}

/// Face bounding box in original image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// True when every coordinate and the score are finite.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height, self.confidence]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_happy_record() {
        let record = RawAnalysis {
            dominant_emotion: Some("happy".into()),
            emotion: scores(&[("happy", 87.3), ("sad", 5.1), ("neutral", 7.6)]),
            ..Default::default()
        };
        let result = EmotionResult::from_record(&record);
        assert_eq!(result.dominant_emotion, Emotion::Happy);
        assert!((result.confidence - 0.873).abs() < 1e-6);
        assert_eq!(result.dominant_emotion.emoji(), "😊");
        assert_eq!(result.percent(), 87);
    }

    #[test]
    fn test_argmax_wins_over_label() {
        let record = RawAnalysis {
            dominant_emotion: Some("sad".into()),
            emotion: scores(&[("angry", 60.0), ("sad", 40.0)]),
            ..Default::default()
        };
        assert_eq!(EmotionResult::from_record(&record).dominant_emotion, Emotion::Angry);
    }

    #[test]
    fn test_label_only_has_zero_confidence() {
        let record = RawAnalysis {
            dominant_emotion: Some("Fear".into()),
            ..Default::default()
        };
        let result = EmotionResult::from_record(&record);
        assert_eq!(result.dominant_emotion, Emotion::Fear);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_empty_record_is_unknown() {
        assert_eq!(EmotionResult::from_record(&RawAnalysis::default()), EmotionResult::unknown());
    }

    #[test]
    fn test_confidence_bounds() {
        for raw in [0.0f32, 12.5, 50.0, 99.99, 100.0] {
            let c = normalize_confidence(raw);
            assert!((0.0..=1.0).contains(&c), "{raw} -> {c}");
        }
        assert_eq!(normalize_confidence(250.0), 1.0);
        assert_eq!(normalize_confidence(-3.0), 0.0);
        assert_eq!(normalize_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_argmax_skips_nan() {
        let s = scores(&[("happy", f32::NAN), ("sad", 3.0)]);
        assert_eq!(argmax(&s), Some(("sad", 3.0)));
        assert_eq!(argmax(&BTreeMap::new()), None);
    }

    #[test]
    fn test_from_label_aliases() {
        assert_eq!(Emotion::from_label("HAPPINESS"), Emotion::Happy);
        assert_eq!(Emotion::from_label("surprised"), Emotion::Surprise);
        assert_eq!(Emotion::from_label(" anger "), Emotion::Angry);
        assert_eq!(Emotion::from_label("contempt"), Emotion::Unknown);
        assert_eq!(Emotion::Unknown.emoji(), PLACEHOLDER_EMOJI);
    }

    #[test]
    fn test_list_and_single_select_same_record() {
        let record = RawAnalysis {
            dominant_emotion: Some("neutral".into()),
            emotion: scores(&[("neutral", 71.0), ("happy", 20.0)]),
            ..Default::default()
        };
        let other = RawAnalysis {
            emotion: scores(&[("angry", 99.0)]),
            ..Default::default()
        };
        let single = ClassifierOutput::Single(record.clone());
        let many = ClassifierOutput::Many(vec![record, other]);
        assert_eq!(single.first(), many.first());
        assert_eq!(ClassifierOutput::Many(vec![]).first(), None);
    }

    #[test]
    fn test_deserialize_deepface_shapes() {
        let single = r#"{"dominant_emotion": "happy", "emotion": {"happy": 87.3, "sad": 5.1}, "age": 31.6,
                         "gender": {"Man": 12.0, "Woman": 88.0}}"#;
        let out: ClassifierOutput = serde_json::from_str(single).unwrap();
        assert!(matches!(out, ClassifierOutput::Single(_)));

        let list = format!("[{single}]");
        let many: ClassifierOutput = serde_json::from_str(&list).unwrap();
        assert!(matches!(many, ClassifierOutput::Many(ref v) if v.len() == 1));
        assert_eq!(out.first(), many.first());

        let attrs = FaceAttributes::from_record(out.first().unwrap());
        assert_eq!(attrs.age, Some(32));
        assert_eq!(attrs.gender.as_deref(), Some("Woman"));
    }

    #[test]
    fn test_gender_label_and_fallback() {
        let labelled = RawAnalysis {
            gender: Some(GenderField::Label("Man".into())),
            ..Default::default()
        };
        assert_eq!(FaceAttributes::from_record(&labelled).gender.as_deref(), Some("Man"));

        let dominant_only = RawAnalysis {
            dominant_gender: Some("Woman".into()),
            age: Some(f32::NAN),
            ..Default::default()
        };
        let attrs = FaceAttributes::from_record(&dominant_only);
        assert_eq!(attrs.gender.as_deref(), Some("Woman"));
        assert_eq!(attrs.age, None);
    }
}
