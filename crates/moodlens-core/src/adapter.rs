//! Classification adapter: the one entry point the pipeline calls.
//!
//! Whatever the classifier does, the caller gets exactly one [`Analysis`].
//! Failures are downgraded to an `Unknown` verdict with a warning attached.

use crate::classifier::EmotionClassifier;
use crate::types::{AnalyzeOptions, Analysis, ClassifierOutput};
use image::RgbImage;

/// Run the classifier on `image` and normalize its output.
pub fn analyze<C>(classifier: &mut C, image: &RgbImage, options: &AnalyzeOptions) -> Analysis
where
    C: EmotionClassifier + ?Sized,
{
    if image.width() == 0 || image.height() == 0 {
        tracing::warn!("refusing to classify an empty image");
        return Analysis::failed("image has no pixels");
    }

    match classifier.classify(image, options) {
        Ok(output) => normalize(&output),
        Err(e) => {
            tracing::warn!(
                classifier = classifier.name(),
                error = %e,
                "emotion classification failed; reporting unknown"
            );
            Analysis::failed(e.to_string())
        }
    }
}

/// Select the first record of the output and derive the analysis from it.
pub fn normalize(output: &ClassifierOutput) -> Analysis {
    match output.first() {
        Some(record) => {
            let analysis = Analysis::from_record(record);
            tracing::debug!(
                emotion = %analysis.result.dominant_emotion,
                confidence = analysis.result.confidence,
                faces = match output {
                    ClassifierOutput::Many(v) => v.len(),
                    ClassifierOutput::Single(_) => 1,
                },
                "classification normalized"
            );
            analysis
        }
        None => Analysis::failed("classifier returned no records"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::types::{Emotion, EmotionResult, RawAnalysis};
    use std::collections::BTreeMap;

    /// Classifier returning a canned response.
    struct Canned(Option<ClassifierOutput>);

    impl EmotionClassifier for Canned {
        fn classify(
            &mut self,
            _image: &RgbImage,
            _options: &AnalyzeOptions,
        ) -> Result<ClassifierOutput, ClassifierError> {
            self.0
                .clone()
                .ok_or_else(|| ClassifierError::InferenceFailed("model exploded".into()))
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn happy() -> RawAnalysis {
        let mut emotion = BTreeMap::new();
        emotion.insert("happy".to_string(), 87.3);
        emotion.insert("sad".to_string(), 5.1);
        RawAnalysis {
            dominant_emotion: Some("happy".into()),
            emotion,
            ..Default::default()
        }
    }

    fn image() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[test]
    fn test_error_becomes_unknown_with_warning() {
        let analysis = analyze(&mut Canned(None), &image(), &AnalyzeOptions::default());
        assert_eq!(analysis.result, EmotionResult::unknown());
        assert!(analysis.warning.unwrap().contains("model exploded"));
    }

    #[test]
    fn test_empty_image_is_rejected_without_calling_model() {
        let mut classifier = Canned(Some(ClassifierOutput::Single(happy())));
        let analysis = analyze(&mut classifier, &RgbImage::new(0, 0), &AnalyzeOptions::default());
        assert_eq!(analysis.result.dominant_emotion, Emotion::Unknown);
        assert!(analysis.warning.is_some());
    }

    #[test]
    fn test_single_and_list_agree() {
        let opts = AnalyzeOptions::default();
        let single = analyze(&mut Canned(Some(ClassifierOutput::Single(happy()))), &image(), &opts);
        let list = analyze(
            &mut Canned(Some(ClassifierOutput::Many(vec![happy(), RawAnalysis::default()]))),
            &image(),
            &opts,
        );
        assert_eq!(single, list);
        assert_eq!(single.result.dominant_emotion, Emotion::Happy);
        assert!(single.warning.is_none());
    }

    #[test]
    fn test_empty_list_is_unknown() {
        let analysis = normalize(&ClassifierOutput::Many(vec![]));
        assert_eq!(analysis.result, EmotionResult::unknown());
        assert!(analysis.warning.is_some());
    }

    #[test]
    fn test_malformed_record_is_unknown() {
        let output: ClassifierOutput =
            serde_json::from_str(r#"{"region": {"x": 0}, "unexpected": true}"#).unwrap();
        let analysis = normalize(&output);
        assert_eq!(analysis.result, EmotionResult::unknown());
    }
}
