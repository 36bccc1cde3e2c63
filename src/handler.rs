//! The job handler: the whole contract surface of the worker.
//!
//! ## Decision tree (re-evaluated per job)
//!
//! ```text
//! prompt, no image, no pdf ──▶ "Echo test: <prompt>"
//! pdf                      ──▶ ensure model ─▶ per page: embedded text | raster ─▶ chain
//! image                    ──▶ ensure model ─▶ chain          (degraded: size + mode only)
//! nothing                  ──▶ ready message
//! ```
//!
//! Every error and every panic is converted into an `{"error": ...}` result;
//! nothing escapes to the runtime.

use crate::config::HandlerConfig;
use crate::error::HandlerError;
use crate::job::{
    ImageOutput, Job, JobResult, Output, PageSummary, PdfOutput, TextSource,
};
use crate::model::{DefaultModelLoader, ModelLoader, ModelSlot};
use crate::pdf::{PagePlan, PageSource, PdfPage, PdfiumPageSource};
use crate::prompts::{echo, page_header, MODEL_UNAVAILABLE_MESSAGE, READY_MESSAGE};
use crate::recognize::encode::image_mode;
use crate::recognize::RecognizerChain;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use image::DynamicImage;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const IMAGE_CONTEXT: &str = "Error processing image";
const PDF_CONTEXT: &str = "Error processing PDF";
const HANDLER_CONTEXT: &str = "Handler error";

/// Prompt echoed back in degraded image results when the job had none.
const NO_PROMPT: &str = "No prompt provided";

/// Handles jobs for the lifetime of the worker process.
///
/// Cheap to share behind an `Arc`; the loaded model lives inside and is
/// reused by every job.
pub struct Handler {
    config: HandlerConfig,
    model: ModelSlot,
    pages: Arc<dyn PageSource>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish()
    }
}

impl Handler {
    /// Handler with the default model loader and pdfium page source.
    pub fn new(config: HandlerConfig) -> Self {
        let loader = Arc::new(DefaultModelLoader::new(config.clone()));
        let pages = Arc::new(PdfiumPageSource::new(config.pdfium_lib_path.clone()));
        Self::with_parts(config, loader, pages)
    }

    /// Handler with caller-supplied collaborators.
    pub fn with_parts(
        config: HandlerConfig,
        loader: Arc<dyn ModelLoader>,
        pages: Arc<dyn PageSource>,
    ) -> Self {
        Self {
            config,
            model: ModelSlot::new(loader),
            pages,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Load the model if it is not loaded yet. Idempotent.
    ///
    /// Returns `None` when loading failed; the failure is logged and the next
    /// call tries again.
    pub async fn ensure_model(&self) -> Option<Arc<RecognizerChain>> {
        match self.model.ensure_loaded().await {
            Ok(chain) => Some(chain),
            Err(e) => {
                warn!("Model unavailable, continuing in degraded mode: {}", e);
                None
            }
        }
    }

    /// Handle a raw JSON job as delivered by the runtime.
    pub async fn handle_value(&self, job: &Value) -> JobResult {
        match Job::from_value(job) {
            Ok(job) => self.handle(&job).await,
            Err(e) => {
                warn!("Rejected job: {}", e);
                JobResult::failure(HANDLER_CONTEXT, e)
            }
        }
    }

    /// Handle one job. Never panics and never returns both output and error.
    pub async fn handle(&self, job: &Job) -> JobResult {
        let start = Instant::now();
        let id = job.id.as_deref().unwrap_or("-");
        info!("Received job {}", id);

        let result = match AssertUnwindSafe(self.dispatch(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => JobResult::failure(HANDLER_CONTEXT, panic_message(panic.as_ref())),
        };

        match &result {
            JobResult::Output(_) => info!("Job {} done in {:?}", id, start.elapsed()),
            JobResult::Error(e) => warn!("Job {} failed in {:?}: {}", id, start.elapsed(), e),
        }
        result
    }

    async fn dispatch(&self, job: &Job) -> JobResult {
        let input = &job.input;

        if input.image.is_none() && input.pdf.is_none() {
            return match input.prompt {
                Some(ref prompt) => JobResult::Output(Output::Message(echo(prompt))),
                None => JobResult::Output(Output::Message(READY_MESSAGE.to_string())),
            };
        }

        let prompt = input.prompt.as_deref();

        if let Some(ref pdf) = input.pdf {
            if input.image.is_some() {
                debug!("Job carries both pdf and image; processing pdf");
            }
            return match self.process_pdf(pdf, prompt).await {
                Ok(out) => JobResult::Output(Output::Pdf(out)),
                Err(e) => JobResult::failure(PDF_CONTEXT, e),
            };
        }

        match input.image {
            Some(ref image) => match self.process_image(image, prompt).await {
                Ok(out) => JobResult::Output(Output::Image(out)),
                Err(e) => JobResult::failure(IMAGE_CONTEXT, e),
            },
            None => JobResult::Output(Output::Message(READY_MESSAGE.to_string())),
        }
    }

    // ── Image path ───────────────────────────────────────────────────────────

    async fn process_image(
        &self,
        image_b64: &str,
        prompt: Option<&str>,
    ) -> Result<ImageOutput, HandlerError> {
        let bytes = decode_base64("image", image_b64)?;
        let image = image::load_from_memory(&bytes)?;
        let image_size = [image.width(), image.height()];
        let mode = image_mode(&image).to_string();
        debug!("Decoded image {}x{} {}", image_size[0], image_size[1], mode);

        let Some(chain) = self.ensure_model().await else {
            return Ok(ImageOutput {
                kind: "image".into(),
                text: None,
                message: Some(MODEL_UNAVAILABLE_MESSAGE.to_string()),
                image_size,
                image_mode: mode,
                model_used: None,
                prompt: prompt.unwrap_or(NO_PROMPT).to_string(),
            });
        };

        let prompt = prompt.unwrap_or(&self.config.default_prompt);
        let recognition = chain.recognize(&image, prompt).await?;

        Ok(ImageOutput {
            kind: "image".into(),
            text: Some(recognition.text),
            message: None,
            image_size,
            image_mode: mode,
            model_used: Some(recognition.model_used),
            prompt: prompt.to_string(),
        })
    }

    // ── PDF path ─────────────────────────────────────────────────────────────

    async fn process_pdf(
        &self,
        pdf_b64: &str,
        prompt: Option<&str>,
    ) -> Result<PdfOutput, HandlerError> {
        let bytes = decode_base64("pdf", pdf_b64)?;
        let chain = self.ensure_model().await;

        let plan = PagePlan::from_config(&self.config);
        let source = Arc::clone(&self.pages);
        let pages = tokio::task::spawn_blocking(move || source.extract(bytes, &plan))
            .await
            .map_err(|e| HandlerError::Internal(format!("PDF task panicked: {e}")))??;

        if pages.is_empty() {
            return Err(HandlerError::EmptyPdf);
        }

        let prompt = prompt.unwrap_or(&self.config.default_prompt);
        let texts: Vec<PageText> = stream::iter(pages.into_iter().map(|page| {
            let chain = chain.clone();
            async move { page_text(page, chain.as_deref(), prompt).await }
        }))
        .buffered(self.config.page_concurrency)
        .try_collect()
        .await?;

        Ok(assemble_pdf(texts))
    }
}

/// Resolved text of one page.
#[derive(Debug)]
struct PageText {
    number: usize,
    text: String,
    source: TextSource,
    model_used: Option<String>,
}

async fn page_text(
    page: PdfPage,
    chain: Option<&RecognizerChain>,
    prompt: &str,
) -> Result<PageText, HandlerError> {
    let PdfPage { number, text, raster } = page;

    let Some(image) = raster else {
        return Ok(PageText {
            number,
            text: text.trim().to_string(),
            source: TextSource::Embedded,
            model_used: None,
        });
    };

    match chain {
        Some(chain) => {
            let recognition = recognize_page(chain, number, &image, prompt).await?;
            Ok(PageText {
                number,
                text: recognition.text,
                source: TextSource::Recognized,
                model_used: Some(recognition.model_used),
            })
        }
        None => Ok(PageText {
            number,
            text: text.trim().to_string(),
            source: TextSource::Unavailable,
            model_used: None,
        }),
    }
}

async fn recognize_page(
    chain: &RecognizerChain,
    number: usize,
    image: &DynamicImage,
    prompt: &str,
) -> Result<crate::recognize::Recognition, HandlerError> {
    chain
        .recognize(image, prompt)
        .await
        .map_err(|e| HandlerError::PageRecognition {
            page: number,
            source: Box::new(e),
        })
}

/// Concatenate page texts in ascending page order under page headers.
fn assemble_pdf(mut texts: Vec<PageText>) -> PdfOutput {
    texts.sort_by_key(|t| t.number);

    let text = texts
        .iter()
        .map(|t| format!("{}\n{}", page_header(t.number), t.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let model_used = texts.iter().find_map(|t| t.model_used.clone());

    let unavailable = texts
        .iter()
        .filter(|t| t.source == TextSource::Unavailable)
        .count();
    let message = (unavailable > 0).then(|| {
        format!("OCR model unavailable; {unavailable} page(s) had too little embedded text")
    });

    let page_sources = texts
        .iter()
        .map(|t| PageSummary {
            page: t.number,
            source: t.source,
            chars: t.text.chars().count(),
        })
        .collect();

    PdfOutput {
        kind: "pdf".into(),
        text,
        pages: texts.len(),
        model_used,
        page_sources,
        message,
    }
}

/// Decode standard base64, ignoring ASCII whitespace anywhere in the input
/// (line-wrapped `base64` output is accepted).
fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, HandlerError> {
    let compact: Vec<u8> = value
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|source| HandlerError::InvalidBase64 { field, source })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}
