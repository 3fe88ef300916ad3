//! Emotion inference adapter: upload bytes in, top emotion out.

use crate::classifier::{ClassifierError, EmotionClassifier};
use crate::detector::{DetectorError, FaceDetector};
use crate::types::EmotionScore;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("unsupported image format (expected JPEG or PNG)")]
    UnsupportedFormat,
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("emotion classification failed: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Capability that turns a decoded picture into its dominant emotion.
///
/// `Ok(None)` means no face was found or no confidence could be computed.
/// It is a valid outcome, not an error.
pub trait EmotionDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<EmotionScore>, InferenceError>;
}

/// SCRFD + FER+ pipeline.
pub struct OnnxEmotionDetector {
    detector: FaceDetector,
    classifier: EmotionClassifier,
}

impl OnnxEmotionDetector {
    pub fn load(detector_path: &str, classifier_path: &str) -> Result<Self, InferenceError> {
        let detector = FaceDetector::load(detector_path)?;
        let classifier = EmotionClassifier::load(classifier_path)?;
        Ok(Self { detector, classifier })
    }
}

impl EmotionDetector for OnnxEmotionDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<EmotionScore>, InferenceError> {
        let faces = self.detector.detect(image)?;
        // Sorted by confidence: the first face is the most confident one.
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "classifying most confident face"
        );
        Ok(self.classifier.classify(image, face)?)
    }
}

/// Decode an uploaded picture. Only JPEG and PNG are accepted.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    let format = match image::guess_format(bytes) {
        Ok(f @ (ImageFormat::Jpeg | ImageFormat::Png)) => f,
        _ => return Err(InferenceError::UnsupportedFormat),
    };
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    Ok(decoded.to_rgb8())
}

/// Re-encode a decoded upload as JPEG, the form in which history stores it.
pub fn encode_for_history(image: &RgbImage) -> Result<Vec<u8>, InferenceError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}
