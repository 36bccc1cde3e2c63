//! Recognizers: everything that can turn an image into text.
//!
//! Each stage implements [`Recognizer`]; a [`RecognizerChain`] tries them in
//! order and reports which one answered.
//!
//! ```text
//! image ──▶ vlm (primary or secondary model) ──▶ ocrs ──▶ tesseract
//!            first success wins; each failure falls through to the next
//! ```
//!
//! 1. [`vlm`]        vision-language model behind an `edgequake-llm` provider
//! 2. [`ocrs`]       pure-Rust detection + recognition models (feature `ocrs`)
//! 3. [`tesseract`]  the tesseract CLI, fed through a scoped temp file
//! 4. [`encode`]     shared image → base64/PNG helpers

pub mod chain;
pub mod encode;
#[cfg(feature = "ocrs")]
pub mod ocrs;
pub mod tesseract;
pub mod vlm;

pub use chain::{Recognition, RecognizerChain};

use crate::error::RecognizeError;
use async_trait::async_trait;
use image::DynamicImage;

/// A provider of the `recognize(image) -> text` capability.
///
/// Implementations must be `Send + Sync`: the loaded chain is shared by every
/// job the worker handles.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Stable name reported as `model_used` in results.
    fn name(&self) -> &str;

    /// Transcribe the text in `image`. `prompt` is advisory; traditional OCR
    /// engines ignore it.
    async fn recognize(&self, image: &DynamicImage, prompt: &str) -> Result<String, RecognizeError>;
}
