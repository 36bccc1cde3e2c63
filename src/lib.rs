//! # ocr-worker
//!
//! An OCR job handler for serverless GPU workers. The runtime hands the
//! worker `{"id": ..., "input": {"prompt"?, "image"?, "pdf"?}}`; the handler
//! answers with `{"output": ...}` or `{"error": ...}`, never both.
//!
//! ## Flow
//!
//! ```text
//! job
//!  │
//!  ├─ prompt only   echo it back ("Echo test: ...")
//!  ├─ image         base64 → decode → recognizer chain
//!  ├─ pdf           base64 → pdfium → embedded text, or raster → recognizer chain
//!  └─ nothing       ready message
//!
//! recognizer chain: vision model (primary, else secondary) → ocrs → tesseract
//! ```
//!
//! The vision model is loaded lazily, once per process. If it cannot be
//! loaded the handler keeps serving in degraded mode: image jobs report the
//! image's size and mode, PDF pages with an embedded text layer still come
//! back as text.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_worker::{Handler, HandlerConfig, ModelSpec};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HandlerConfig::builder()
//!         .model(ModelSpec::new("openai", "rednote-hilab/dots.ocr"))
//!         .build()?;
//!     let handler = Handler::new(config);
//!     let result = handler
//!         .handle_value(&json!({"id": "1", "input": {"prompt": "ping"}}))
//!         .await;
//!     println!("{}", serde_json::to_string(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-worker` binary (clap + anyhow + tracing-subscriber) |
//! | `ocrs`  | on      | Pure-Rust traditional OCR stage (ocrs + rten) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod model;
pub mod pdf;
pub mod postprocess;
pub mod prompts;
pub mod recognize;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HandlerConfig, HandlerConfigBuilder, ModelSpec, OcrsModels, TesseractConfig};
pub use error::{HandlerError, RecognizeError, WorkerError};
pub use handler::Handler;
pub use job::{ImageOutput, Job, JobInput, JobResult, Output, PageSummary, PdfOutput, TextSource};
pub use model::{DefaultModelLoader, ModelLoader, ModelSlot};
pub use pdf::{PagePlan, PageSource, PdfPage, PdfiumPageSource};
pub use recognize::{Recognition, Recognizer, RecognizerChain};
pub use worker::{poll, run_lines, HttpJobSource, JobReply, WorkerStats};
