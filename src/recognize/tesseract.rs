//! Tesseract CLI recognizer.
//!
//! tesseract reads its input from a path, so each call writes the image to a
//! [`NamedTempFile`] that lives only for the duration of the call. The file is
//! removed when the guard drops: on success, on error, and on unwind. Each
//! call gets its own file, so concurrent jobs never share a path.

use super::{encode, Recognizer};
use crate::config::TesseractConfig;
use crate::error::RecognizeError;
use crate::postprocess::normalise_whitespace;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

/// Traditional OCR stage that shells out to `tesseract <image> stdout`.
pub struct TesseractRecognizer {
    config: TesseractConfig,
}

impl TesseractRecognizer {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }
}

/// Write `image` as PNG into a fresh temp file that is deleted on drop.
pub fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile, RecognizeError> {
    let png = encode::to_png(image)?;
    let mut file = tempfile::Builder::new()
        .prefix("ocr-worker-")
        .suffix(".png")
        .tempfile()
        .map_err(RecognizeError::TempFile)?;
    file.write_all(&png).map_err(RecognizeError::TempFile)?;
    file.flush().map_err(RecognizeError::TempFile)?;
    Ok(file)
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &DynamicImage, _prompt: &str) -> Result<String, RecognizeError> {
        let temp = write_temp_png(image)?;
        debug!("tesseract: input {}", temp.path().display());

        let output = Command::new(&self.config.binary)
            .arg(temp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RecognizeError::Process {
                program: self.config.binary.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognizeError::Process {
                program: self.config.binary.clone(),
                detail: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(normalise_whitespace(&String::from_utf8_lossy(&output.stdout)))
    }
}
