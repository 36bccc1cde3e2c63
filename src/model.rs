//! Lazily loaded, process-wide recognizer chain.
//!
//! The worker loads its model once and reuses it for every job. [`ModelSlot`]
//! wraps an async once-cell: concurrent first callers wait on a single load,
//! later callers get the same `Arc`. A failed load leaves the slot empty so
//! the next job tries again.

use crate::config::HandlerConfig;
use crate::error::HandlerError;
use crate::recognize::tesseract::TesseractRecognizer;
use crate::recognize::vlm::VisionModelRecognizer;
use crate::recognize::{Recognizer, RecognizerChain};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Builds the recognizer chain. Called at most once per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<RecognizerChain, HandlerError>;
}

/// Holder for the loaded chain.
pub struct ModelSlot {
    loader: Arc<dyn ModelLoader>,
    chain: OnceCell<Arc<RecognizerChain>>,
}

impl ModelSlot {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            chain: OnceCell::new(),
        }
    }

    /// Load the chain if needed and return it. No-op once loaded.
    pub async fn ensure_loaded(&self) -> Result<Arc<RecognizerChain>, HandlerError> {
        self.chain
            .get_or_try_init(|| async {
                let chain = self.loader.load().await?;
                info!("Model loaded: {:?}", chain);
                Ok::<_, HandlerError>(Arc::new(chain))
            })
            .await
            .map(Arc::clone)
    }

    /// The loaded chain, without triggering a load.
    pub fn get(&self) -> Option<Arc<RecognizerChain>> {
        self.chain.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.chain.initialized()
    }
}

impl fmt::Debug for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSlot")
            .field("chain", &self.chain.get())
            .finish()
    }
}

/// Loads the configured vision models and traditional OCR stages.
///
/// Models are tried in [`HandlerConfig::models`] order; the first that
/// connects (and answers the warm-up request when enabled) heads the chain.
/// If none does, loading fails and the handler runs degraded. Traditional OCR
/// stages are appended afterwards; one that fails to load is skipped.
#[derive(Debug, Clone)]
pub struct DefaultModelLoader {
    config: HandlerConfig,
}

impl DefaultModelLoader {
    pub fn new(config: HandlerConfig) -> Self {
        Self { config }
    }

    async fn load_vision_model(&self) -> Result<Arc<dyn Recognizer>, HandlerError> {
        let mut attempts = Vec::new();

        for spec in &self.config.models {
            info!("Loading model {}", spec);
            let recognizer = match VisionModelRecognizer::connect(spec, &self.config) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Model {} unavailable: {}", spec, e);
                    attempts.push(format!("{spec}: {e}"));
                    continue;
                }
            };
            if self.config.warm_up_models {
                if let Err(e) = recognizer.warm_up().await {
                    warn!("Model {} failed warm-up: {}", spec, e);
                    attempts.push(format!("{spec}: {e}"));
                    continue;
                }
            }
            return Ok(Arc::new(recognizer));
        }

        if attempts.is_empty() {
            attempts.push("no models configured".to_string());
        }
        Err(HandlerError::ModelLoad { attempts })
    }

    fn traditional_stages(&self) -> Vec<Arc<dyn Recognizer>> {
        let mut stages: Vec<Arc<dyn Recognizer>> = Vec::new();

        #[cfg(feature = "ocrs")]
        if let Some(ref models) = self.config.ocrs {
            match crate::recognize::ocrs::OcrsRecognizer::load(models) {
                Ok(r) => stages.push(Arc::new(r)),
                Err(e) => warn!("Skipping ocrs stage: {}", e),
            }
        }
        #[cfg(not(feature = "ocrs"))]
        if self.config.ocrs.is_some() {
            warn!("Skipping ocrs stage: built without the `ocrs` feature");
        }

        if let Some(ref t) = self.config.tesseract {
            stages.push(Arc::new(TesseractRecognizer::new(t.clone())));
        }

        stages
    }
}

#[async_trait]
impl ModelLoader for DefaultModelLoader {
    async fn load(&self) -> Result<RecognizerChain, HandlerError> {
        let head = self.load_vision_model().await?;
        let mut chain = RecognizerChain::new(vec![head]);
        for stage in self.traditional_stages() {
            chain.push(stage);
        }
        Ok(chain)
    }
}
