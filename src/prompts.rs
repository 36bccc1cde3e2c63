//! Prompts for vision-model OCR.
//!
//! Callers override these through [`crate::config::HandlerConfig`] or, for the
//! user turn, per job via the `prompt` input field.

/// User-turn prompt used when a job does not supply one.
pub const DEFAULT_OCR_PROMPT: &str = "Please extract all text from this image.";

/// System message sent ahead of every vision-model request.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe the text visible in the image.

Rules:
- Preserve the reading order a human would follow
- Keep line breaks between paragraphs, list items and table rows
- Render tables as GFM pipe tables and formulas as LaTeX
- Do not translate, summarise, or correct the text
- Output ONLY the transcribed text, with no commentary and no code fences"#;

/// Text-only request used to confirm a model is being served.
pub const WARM_UP_PROMPT: &str = "Reply with the single word: ready";

/// Message returned when a job carries no recognized content key.
pub const READY_MESSAGE: &str = "Handler is working but no valid input provided";

/// Degraded-mode message for image jobs.
pub const MODEL_UNAVAILABLE_MESSAGE: &str = "Image received successfully; OCR model unavailable";

/// Echo reply for prompt-only jobs.
pub fn echo(prompt: &str) -> String {
    format!("Echo test: {prompt}")
}

/// Header placed before each page's text in a PDF result.
pub fn page_header(page_num: usize) -> String {
    format!("--- Page {page_num} ---")
}
