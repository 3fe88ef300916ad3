//! FER+ facial emotion classifier via ONNX Runtime.
//!
//! Classifies a face crop into eight emotions using the `emotion-ferplus-8`
//! model: 64x64 grayscale input, raw pixel values, eight unnormalized scores.

use crate::types::{BoundingBox, EmotionLabel, EmotionScore};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (different from SCRFD!) ---
const FERPLUS_INPUT_SIZE: u32 = 64;
const FERPLUS_CLASSES: usize = 8;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+-based emotion classifier.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
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

        Ok(Self { session })
    }

    /// Classify the face inside `face` on `image`.
    ///
    /// Returns `None` when the box does not overlap the image or the
    /// probabilities cannot be computed.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Option<EmotionScore>, ClassifierError> {
        let Some(crop) = crop_face(image, face) else {
            tracing::debug!(?face, "face box outside image, skipping classification");
            return Ok(None);
        };

        let input = preprocess(&crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        if logits.len() != FERPLUS_CLASSES {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {FERPLUS_CLASSES} emotion scores, got {}",
                logits.len()
            )));
        }

        Ok(top_emotion(&softmax(logits)))
    }
}

/// Crop the face region and turn it into the classifier's 64x64 grayscale input.
pub fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<GrayImage> {
    let (x, y, w, h) = face.clip_to(image.width(), image.height())?;
    let region = image::imageops::crop_imm(image, x, y, w, h).to_image();
    let gray = image::DynamicImage::ImageRgb8(region).to_luma8();
    Some(image::imageops::resize(
        &gray,
        FERPLUS_INPUT_SIZE,
        FERPLUS_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

/// FER+ takes raw grayscale values in NCHW with a single channel.
fn preprocess(face: &GrayImage) -> Array4<f32> {
    let size = FERPLUS_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (x, y, pixel) in face.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }
    tensor
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Highest-probability label. `None` if the vector is empty or contains NaN.
pub fn top_emotion(probabilities: &[f32]) -> Option<EmotionScore> {
    if probabilities.iter().any(|p| p.is_nan()) {
        return None;
    }
    let (index, &score) = probabilities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    EmotionScore::new(EmotionLabel::from_index(index)?, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0, -4.0, 0.5, 0.0, 7.0, 1.0]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let p = softmax(&[1000.0, 0.0]);
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!(p[1] < 1e-6);
    }

    #[test]
    fn test_top_emotion_picks_max() {
        let mut probs = vec![0.01f32; FERPLUS_CLASSES];
        probs[3] = 0.93;
        let top = top_emotion(&probs).unwrap();
        assert_eq!(top.label, EmotionLabel::Sad);
        assert!((top.score - 0.93).abs() < 1e-6);
    }

    #[test]
    fn test_top_emotion_empty_or_nan() {
        assert!(top_emotion(&[]).is_none());
        assert!(top_emotion(&[0.5, f32::NAN]).is_none());
    }

    #[test]
    fn test_top_emotion_out_of_vocabulary_index() {
        let mut probs = vec![0.0f32; FERPLUS_CLASSES + 1];
        probs[FERPLUS_CLASSES] = 1.0;
        assert!(top_emotion(&probs).is_none());
    }

    #[test]
    fn test_crop_face_output_shape() {
        let img = RgbImage::from_pixel(200, 100, Rgb([10, 200, 30]));
        let face = BoundingBox {
            x: 50.0, y: 10.0, width: 80.0, height: 80.0,
            confidence: 0.9,
        };
        let crop = crop_face(&img, &face).unwrap();
        assert_eq!(crop.dimensions(), (FERPLUS_INPUT_SIZE, FERPLUS_INPUT_SIZE));
    }

    #[test]
    fn test_crop_face_outside_image() {
        let img = RgbImage::new(50, 50);
        let face = BoundingBox {
            x: 60.0, y: 60.0, width: 10.0, height: 10.0,
            confidence: 0.9,
        };
        assert!(crop_face(&img, &face).is_none());
    }

    #[test]
    fn test_preprocess_keeps_raw_pixels() {
        let face = GrayImage::from_pixel(FERPLUS_INPUT_SIZE, FERPLUS_INPUT_SIZE, image::Luma([200]));
        let tensor = preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert_eq!(tensor[[0, 0, 0, 0]], 200.0);
        assert_eq!(tensor[[0, 0, 63, 63]], 200.0);
    }

    #[test]
    fn test_load_missing_model() {
        let err = EmotionClassifier::load("/nonexistent/emotion-ferplus-8.onnx").err().unwrap();
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
    }
}
