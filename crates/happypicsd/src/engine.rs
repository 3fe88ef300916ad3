use happypics_core::{decode_upload, encode_for_history, EmotionDetector, EmotionScore, InferenceError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Inference(#[from] InferenceError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A face was found and classified.
pub struct Detection {
    pub score: EmotionScore,
    /// The upload re-encoded as JPEG, the bytes history stores and compares.
    pub stored_image: Vec<u8>,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        upload: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Detection>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode an upload and detect its dominant emotion.
    ///
    /// `Ok(None)` when no face was found.
    pub async fn analyze(&self, upload: Vec<u8>) -> Result<Option<Detection>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                upload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// True while the engine thread, and with it the loaded models, is alive.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Spawn the engine on a dedicated OS thread that owns the detector.
///
/// Inference sessions are not shared: every request is served in turn.
pub fn spawn_engine(
    mut detector: Box<dyn EmotionDetector>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth);

    std::thread::Builder::new()
        .name("happypics-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { upload, reply } => {
                        let result = run_analyze(detector.as_mut(), &upload);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_analyze(
    detector: &mut dyn EmotionDetector,
    upload: &[u8],
) -> Result<Option<Detection>, EngineError> {
    let image = decode_upload(upload)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        bytes = upload.len(),
        "analyze: upload decoded"
    );

    let Some(score) = detector.detect(&image)? else {
        tracing::info!("analyze: no face detected");
        return Ok(None);
    };

    tracing::info!(emotion = %score.label, score = score.score, "analyze: emotion detected");
    let stored_image = encode_for_history(&image)?;
    Ok(Some(Detection {
        score,
        stored_image,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use happypics_core::EmotionLabel;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Reports "happy" unless the top-left pixel is black, which means "no face".
    pub(crate) struct PixelDetector;

    impl EmotionDetector for PixelDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Option<EmotionScore>, InferenceError> {
            if image.get_pixel(0, 0) == &Rgb([0, 0, 0]) {
                return Ok(None);
            }
            Ok(EmotionScore::new(EmotionLabel::Happy, 0.9))
        }
    }

    pub(crate) fn png(color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(12, 12, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_analyze_detects() {
        let engine = spawn_engine(Box::new(PixelDetector), 2).unwrap();
        assert!(engine.is_running());
        let detection = engine.analyze(png([200, 180, 160])).await.unwrap().unwrap();
        assert_eq!(detection.score.label, EmotionLabel::Happy);
        // Stored as JPEG, not as the PNG that was uploaded
        assert_eq!(&detection.stored_image[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_analyze_no_face() {
        let engine = spawn_engine(Box::new(PixelDetector), 2).unwrap();
        assert!(engine.analyze(png([0, 0, 0])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_analyze_malformed_upload() {
        let engine = spawn_engine(Box::new(PixelDetector), 2).unwrap();
        let err = engine.analyze(b"not an image".to_vec()).await.err().unwrap();
        assert!(matches!(err, EngineError::Inference(InferenceError::UnsupportedFormat)));
    }

    #[tokio::test]
    async fn test_same_upload_encodes_identically() {
        let engine = spawn_engine(Box::new(PixelDetector), 2).unwrap();
        let a = engine.analyze(png([10, 20, 30])).await.unwrap().unwrap();
        let b = engine.analyze(png([10, 20, 30])).await.unwrap().unwrap();
        assert_eq!(a.stored_image, b.stored_image);
    }
}
