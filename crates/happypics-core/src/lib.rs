//! happypics-core — Emotion inference and history chart data.
//!
//! Uses SCRFD for face detection and FER+ for emotion classification,
//! both running via ONNX Runtime for CPU inference. Chart projections
//! are pure functions over the recorded history.

pub mod charts;
pub mod classifier;
pub mod detector;
pub mod inference;
pub mod types;

use std::path::PathBuf;

pub use classifier::EmotionClassifier;
pub use detector::FaceDetector;
pub use inference::{decode_upload, encode_for_history, EmotionDetector, InferenceError, OnnxEmotionDetector};
pub use types::{BoundingBox, EmotionLabel, EmotionScore, HistoryRecord};

/// Default location of the ONNX model files.
///
/// `$XDG_DATA_HOME/happypics/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("happypics")
        .join("models")
}
