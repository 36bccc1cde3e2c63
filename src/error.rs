//! Error types for the ocr-worker library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`HandlerError`]: the job cannot produce an output (bad base64, an
//!   undecodable image, a corrupt PDF, every recognizer failed). The handler
//!   turns it into an `{"error": ...}` result; the process keeps running.
//!
//! * [`RecognizeError`]: a single recognizer stage failed. Stored inside the
//!   chain's attempt list so the next stage can run; only surfaces to the
//!   caller once every stage has failed.
//!
//! * [`WorkerError`]: the adapter between the runtime and the handler failed
//!   (stdin closed, job URL unreachable). Never produced by `handle`.

use thiserror::Error;

/// Errors that end a job with an `{"error": ...}` result.
#[derive(Debug, Error)]
pub enum HandlerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A content field did not hold valid base64.
    #[error("invalid base64 in '{field}': {source}")]
    InvalidBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// The decoded `image` bytes are not an image format we can read.
    #[error("cannot decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The job envelope itself is malformed (e.g. `input` is not a mapping).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF engine could not be bound or the document could not be opened.
    #[error("cannot open PDF: {detail}")]
    PdfOpen { detail: String },

    /// Text extraction or rasterisation failed for a page.
    #[error("page {page}: {detail}")]
    PdfRender { page: usize, detail: String },

    /// A rasterised page could not be recognized by any stage.
    #[error("page {page}: {source}")]
    PageRecognition {
        page: usize,
        #[source]
        source: Box<HandlerError>,
    },

    /// The document opened but contains no pages.
    #[error("PDF has no pages")]
    EmptyPdf,

    // ── Model errors ──────────────────────────────────────────────────────
    /// No configured model could be loaded.
    #[error("no model could be loaded: {}", .attempts.join("; "))]
    ModelLoad { attempts: Vec<String> },

    /// Every recognizer in the chain failed on the same image.
    #[error("all recognizers failed: {}", join_attempts(.attempts))]
    AllRecognizersFailed { attempts: Vec<(String, RecognizeError)> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (blocking task panicked, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_attempts(attempts: &[(String, RecognizeError)]) -> String {
    if attempts.is_empty() {
        return "no recognizers configured".to_string();
    }
    attempts
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single recognizer stage.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// The LLM provider call failed.
    #[error("provider call failed: {0}")]
    Provider(String),

    /// The image could not be encoded for the recognizer.
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// An in-process OCR engine reported an error.
    #[error("OCR engine error: {0}")]
    Engine(String),

    /// An external OCR process could not be spawned or exited non-zero.
    #[error("{program}: {detail}")]
    Process { program: String, detail: String },

    /// The scoped temporary image file could not be prepared.
    #[error("temporary file: {0}")]
    TempFile(#[source] std::io::Error),
}

/// Failures of the runtime adapter, outside any single job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime's job or result endpoint could not be reached.
    #[error("transport error for '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The runtime sent a job payload that is not JSON.
    #[error("cannot decode job payload: {0}")]
    Decode(#[from] serde_json::Error),
}
