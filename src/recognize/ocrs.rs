//! Pure-Rust traditional OCR via `ocrs` (text detection + line recognition).
//!
//! The engine is CPU-bound, so recognition runs inside `spawn_blocking`.

use super::Recognizer;
use crate::config::OcrsModels;
use crate::error::RecognizeError;
use async_trait::async_trait;
use image::DynamicImage;
use ::ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::sync::Arc;
use tracing::{debug, info};

/// Traditional OCR stage backed by `ocrs` models loaded through `rten`.
pub struct OcrsRecognizer {
    engine: Arc<OcrEngine>,
}

impl OcrsRecognizer {
    /// Load the detection and recognition models from disk.
    pub fn load(models: &OcrsModels) -> Result<Self, RecognizeError> {
        let detection_model = Model::load_file(&models.detection).map_err(|e| {
            RecognizeError::Engine(format!(
                "detection model '{}': {e}",
                models.detection.display()
            ))
        })?;
        let recognition_model = Model::load_file(&models.recognition).map_err(|e| {
            RecognizeError::Engine(format!(
                "recognition model '{}': {e}",
                models.recognition.display()
            ))
        })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| RecognizeError::Engine(e.to_string()))?;

        info!("ocrs engine loaded");
        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

#[async_trait]
impl Recognizer for OcrsRecognizer {
    fn name(&self) -> &str {
        "ocrs"
    }

    async fn recognize(&self, image: &DynamicImage, _prompt: &str) -> Result<String, RecognizeError> {
        let engine = Arc::clone(&self.engine);
        let rgb = image.to_rgb8();

        let text = tokio::task::spawn_blocking(move || -> Result<String, RecognizeError> {
            let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
                .map_err(|e| RecognizeError::Engine(e.to_string()))?;
            let input = engine
                .prepare_input(source)
                .map_err(|e| RecognizeError::Engine(e.to_string()))?;
            engine
                .get_text(&input)
                .map_err(|e| RecognizeError::Engine(e.to_string()))
        })
        .await
        .map_err(|e| RecognizeError::Engine(format!("ocrs task panicked: {e}")))??;

        debug!("ocrs: {} chars", text.len());
        Ok(crate::postprocess::normalise_whitespace(&text))
    }
}
