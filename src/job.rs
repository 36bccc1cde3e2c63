//! Job envelope and result types exchanged with the serverless runtime.
//!
//! The runtime hands the handler `{"id": ..., "input": {...}}` and expects back
//! a mapping with exactly one of `output` or `error`. [`JobResult`] is an
//! externally tagged enum, so serde enforces that invariant on the wire.

use crate::error::HandlerError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single unit of work submitted by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Runtime-assigned identifier; absent in locally crafted jobs. Numeric
    /// ids are kept as their decimal string.
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    /// A missing or `null` input is treated as `{}`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub input: JobInput,
}

impl Job {
    /// Parse a raw JSON job, tolerating a missing `input` and unknown keys.
    pub fn from_value(value: &Value) -> Result<Self, HandlerError> {
        Job::deserialize(value).map_err(|e| HandlerError::InvalidJob(e.to_string()))
    }
}

/// The job id carried by `value`, if any: strings as-is, other scalars in
/// their JSON form, `null` as absent.
pub fn job_id(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn id_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(job_id))
}

fn null_as_default<'de, D: Deserializer<'de>>(d: D) -> Result<JobInput, D::Error> {
    Ok(Option::<JobInput>::deserialize(d)?.unwrap_or_default())
}

/// The recognized keys of a job's `input` mapping. Unknown keys are ignored;
/// `null` counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Base64-encoded image bytes (PNG, JPEG).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Base64-encoded PDF bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
}

/// What the handler returns for every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Output(Output),
    Error(String),
}

impl JobResult {
    /// Build an error result prefixed with the processing stage.
    pub fn failure(context: &str, err: impl std::fmt::Display) -> Self {
        JobResult::Error(format!("{context}: {err}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JobResult::Error(_))
    }

    pub fn output(&self) -> Option<&Output> {
        match self {
            JobResult::Output(o) => Some(o),
            JobResult::Error(_) => None,
        }
    }
}

/// Successful job payload. Echo and ready replies are plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Output {
    Pdf(PdfOutput),
    Image(ImageOutput),
    Message(String),
}

/// Result of an image job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutput {
    /// Always `"image"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Recognized text; absent in degraded mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Degraded-mode explanation; absent when text was recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `[width, height]` of the decoded image.
    pub image_size: [u32; 2],
    pub image_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub prompt: String,
}

/// Result of a PDF job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfOutput {
    /// Always `"pdf"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Page texts in ascending page order, each under a page header.
    pub text: String,
    pub pages: usize,
    /// Recognizer that handled sparse pages, if any page needed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub page_sources: Vec<PageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-page provenance in a [`PdfOutput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page: usize,
    pub source: TextSource,
    /// Character count of the page text.
    pub chars: usize,
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Embedded text layer, used directly.
    Embedded,
    /// Rasterised and run through the recognizer chain.
    Recognized,
    /// Too sparse for direct use and no model was available.
    Unavailable,
}
