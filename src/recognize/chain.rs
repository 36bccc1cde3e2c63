//! Ordered fallback over recognizer stages.

use super::Recognizer;
use crate::error::HandlerError;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Text produced by the first stage that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    /// Name of the stage that produced `text`.
    pub model_used: String,
}

/// Recognizer stages tried in sequence until one succeeds.
///
/// The head is the loaded vision model; traditional OCR stages follow. The
/// chain does not care how many stages exist.
#[derive(Clone, Default)]
pub struct RecognizerChain {
    stages: Vec<Arc<dyn Recognizer>>,
}

impl RecognizerChain {
    pub fn new(stages: Vec<Arc<dyn Recognizer>>) -> Self {
        Self { stages }
    }

    /// Append a stage after the existing ones.
    pub fn push(&mut self, stage: Arc<dyn Recognizer>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Name of the first stage, i.e. the loaded model.
    pub fn head_name(&self) -> Option<&str> {
        self.stages.first().map(|s| s.name())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run each stage on `image` until one returns text.
    ///
    /// Every failure is logged and kept; if no stage succeeds the collected
    /// failures are returned in [`HandlerError::AllRecognizersFailed`].
    pub async fn recognize(
        &self,
        image: &DynamicImage,
        prompt: &str,
    ) -> Result<Recognition, HandlerError> {
        let mut attempts = Vec::new();

        for stage in &self.stages {
            match stage.recognize(image, prompt).await {
                Ok(text) => {
                    debug!("{}: recognized {} chars", stage.name(), text.len());
                    return Ok(Recognition {
                        text,
                        model_used: stage.name().to_string(),
                    });
                }
                Err(e) => {
                    warn!("{} failed, falling back: {}", stage.name(), e);
                    attempts.push((stage.name().to_string(), e));
                }
            }
        }

        Err(HandlerError::AllRecognizersFailed { attempts })
    }
}

impl fmt::Debug for RecognizerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}
