//! Configuration for the OCR job handler.
//!
//! All handler behaviour is controlled through [`HandlerConfig`], built via
//! its [`HandlerConfigBuilder`]. The worker binary maps CLI flags (each with an
//! environment-variable fallback) onto the builder; library users set only the
//! knobs they care about and rely on the defaults for the rest.

use crate::error::HandlerError;
use crate::prompts::{DEFAULT_OCR_PROMPT, DEFAULT_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for [`crate::Handler`].
///
/// # Example
/// ```rust
/// use ocr_worker::{HandlerConfig, ModelSpec};
///
/// let config = HandlerConfig::builder()
///     .model(ModelSpec::new("openai", "rednote-hilab/dots.ocr"))
///     .model(ModelSpec::new("openai", "gpt-4.1-nano"))
///     .min_page_text_chars(80)
///     .build()
///     .unwrap();
/// assert_eq!(config.models.len(), 2);
/// ```
#[derive(Clone)]
pub struct HandlerConfig {
    /// Prompt sent with the image when the job carries none.
    pub default_prompt: String,

    /// System message for vision-model recognizers.
    pub system_prompt: String,

    /// Models to try, in order, when loading. The first that loads becomes the
    /// head of the recognizer chain; later entries are only used if earlier
    /// ones fail to load.
    pub models: Vec<ModelSpec>,

    /// Send a one-token request to each model while loading so an unreachable
    /// endpoint is caught at load time instead of on the first page. Default: true.
    pub warm_up_models: bool,

    /// Sampling temperature for vision-model calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens a vision model may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// PDF pages whose embedded text has fewer characters than this (after
    /// trimming) are rasterised and recognized instead. Default: 50.
    pub min_page_text_chars: usize,

    /// Scale factor applied to the page's natural size when rasterising a
    /// sparse page. Default: 2.0.
    pub render_scale: f32,

    /// Upper bound on either edge of a rasterised page, in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// Number of sparse PDF pages recognized concurrently. Default: 1.
    pub page_concurrency: usize,

    /// Path to a pdfium library file or the directory containing it.
    /// If None, the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Model files for the pure-Rust traditional OCR stage. None disables it.
    pub ocrs: Option<OcrsModels>,

    /// Tesseract CLI stage. None disables it.
    pub tesseract: Option<TesseractConfig>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            default_prompt: DEFAULT_OCR_PROMPT.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            models: Vec::new(),
            warm_up_models: true,
            temperature: 0.1,
            max_tokens: 4096,
            min_page_text_chars: 50,
            render_scale: 2.0,
            max_rendered_pixels: 2400,
            page_concurrency: 1,
            pdfium_lib_path: None,
            ocrs: None,
            tesseract: Some(TesseractConfig::default()),
        }
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("default_prompt", &self.default_prompt)
            .field("system_prompt", &format!("<{} chars>", self.system_prompt.len()))
            .field("models", &self.models)
            .field("warm_up_models", &self.warm_up_models)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("min_page_text_chars", &self.min_page_text_chars)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_concurrency", &self.page_concurrency)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("ocrs", &self.ocrs)
            .field("tesseract", &self.tesseract)
            .finish()
    }
}

impl HandlerConfig {
    /// Create a new builder for `HandlerConfig`.
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`HandlerConfig`].
#[derive(Debug)]
pub struct HandlerConfigBuilder {
    config: HandlerConfig,
}

impl HandlerConfigBuilder {
    pub fn default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    /// Append a model to the load order.
    pub fn model(mut self, spec: ModelSpec) -> Self {
        self.config.models.push(spec);
        self
    }

    pub fn warm_up_models(mut self, v: bool) -> Self {
        self.config.warm_up_models = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn min_page_text_chars(mut self, n: usize) -> Self {
        self.config.min_page_text_chars = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn ocrs(mut self, models: OcrsModels) -> Self {
        self.config.ocrs = Some(models);
        self
    }

    /// Replace the tesseract stage; `None` disables it.
    pub fn tesseract(mut self, tesseract: Option<TesseractConfig>) -> Self {
        self.config.tesseract = tesseract;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HandlerConfig, HandlerError> {
        let c = &self.config;
        if !(c.render_scale.is_finite() && c.render_scale > 0.0 && c.render_scale <= 8.0) {
            return Err(HandlerError::InvalidConfig(format!(
                "render scale must be in (0, 8], got {}",
                c.render_scale
            )));
        }
        if c.default_prompt.trim().is_empty() {
            return Err(HandlerError::InvalidConfig(
                "default prompt must not be empty".into(),
            ));
        }
        if let Some(spec) = c.models.iter().find(|m| m.provider.is_empty() || m.model.is_empty()) {
            return Err(HandlerError::InvalidConfig(format!(
                "model spec '{spec}' needs both a provider and a model id"
            )));
        }
        if let Some(ref t) = c.tesseract {
            if t.binary.trim().is_empty() {
                return Err(HandlerError::InvalidConfig(
                    "tesseract binary must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Component configs ────────────────────────────────────────────────────

/// A vision model reachable through an `edgequake-llm` provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider name understood by `edgequake_llm::ProviderFactory`
    /// (e.g. "openai", "ollama", "anthropic").
    pub provider: String,
    /// Model identifier served by that provider.
    pub model: String,
}

impl ModelSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Detection and recognition model files for the `ocrs` engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrsModels {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

/// Settings for the tesseract CLI stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseractConfig {
    /// Executable name or path. Default: "tesseract".
    pub binary: String,
    /// Language pack(s), passed as `-l`. Default: "eng".
    pub language: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}
