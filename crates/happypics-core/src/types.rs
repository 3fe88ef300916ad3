use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bounding box for a detected face, in image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Clip the box to an image of the given size, returning integer pixel bounds
    /// `(x, y, width, height)`, or `None` if nothing of the box remains.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(image_width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(image_height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Emotion vocabulary produced by the FER+ classifier.
///
/// Variant order matches the classifier's output logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Surprise,
    Sad,
    Angry,
    Disgust,
    Fear,
    Contempt,
}

impl EmotionLabel {
    /// All labels, in classifier output order.
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Neutral,
        EmotionLabel::Happy,
        EmotionLabel::Surprise,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Contempt => "contempt",
        }
    }

    /// Label for the classifier output at `index`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown emotion label: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// Top emotion of the most confident face in an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: EmotionLabel,
    /// Classifier probability in [0, 1].
    pub score: f32,
}

impl EmotionScore {
    /// Build a score, clamping into [0, 1]. NaN yields `None`: a confidence
    /// that cannot be computed is treated as no result.
    pub fn new(label: EmotionLabel, score: f32) -> Option<Self> {
        if score.is_nan() {
            return None;
        }
        Some(Self {
            label,
            score: score.clamp(0.0, 1.0),
        })
    }
}

/// One stored classification event.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Row id in the durable store; `None` for in-memory records.
    pub id: Option<i64>,
    /// Owner of the record; `None` in the unauthenticated variant.
    pub identity: Option<String>,
    /// Encoded picture (JPEG) exactly as stored.
    pub image: Vec<u8>,
    pub emotion: EmotionLabel,
    pub score: f32,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip_str() {
        for label in EmotionLabel::ALL {
            assert_eq!(label.as_str().parse::<EmotionLabel>(), Ok(label));
        }
    }

    #[test]
    fn test_label_unknown() {
        let err = "bored".parse::<EmotionLabel>().unwrap_err();
        assert_eq!(err, UnknownEmotion("bored".into()));
    }

    #[test]
    fn test_label_serde_matches_as_str() {
        let json = serde_json::to_string(&EmotionLabel::Happy).unwrap();
        assert_eq!(json, "\"happy\"");
    }

    #[test]
    fn test_label_from_index() {
        assert_eq!(EmotionLabel::from_index(1), Some(EmotionLabel::Happy));
        assert_eq!(EmotionLabel::from_index(7), Some(EmotionLabel::Contempt));
        assert_eq!(EmotionLabel::from_index(8), None);
    }

    #[test]
    fn test_score_clamped() {
        let s = EmotionScore::new(EmotionLabel::Sad, 1.3).unwrap();
        assert_eq!(s.score, 1.0);
        let s = EmotionScore::new(EmotionLabel::Sad, -0.2).unwrap();
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_score_nan_rejected() {
        assert!(EmotionScore::new(EmotionLabel::Fear, f32::NAN).is_none());
    }

    #[test]
    fn test_clip_inside() {
        let b = BoundingBox {
            x: 10.2, y: 20.7, width: 30.0, height: 40.0,
            confidence: 0.9,
        };
        assert_eq!(b.clip_to(100, 100), Some((10, 20, 31, 41)));
    }

    #[test]
    fn test_clip_overhanging() {
        let b = BoundingBox {
            x: -5.0, y: 90.0, width: 20.0, height: 20.0,
            confidence: 0.9,
        };
        assert_eq!(b.clip_to(100, 100), Some((0, 90, 15, 10)));
    }

    #[test]
    fn test_clip_outside() {
        let b = BoundingBox {
            x: 150.0, y: 0.0, width: 20.0, height: 20.0,
            confidence: 0.9,
        };
        assert_eq!(b.clip_to(100, 100), None);
    }
}
