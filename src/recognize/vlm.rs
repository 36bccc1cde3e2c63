//! Vision-language model recognizer.
//!
//! Sends one image per request: a system message with the OCR rules, then a
//! user turn carrying the job's prompt and the base64 PNG. No retries happen
//! here; a failed call falls through to the next stage of the chain.

use super::{encode, Recognizer};
use crate::config::{HandlerConfig, ModelSpec};
use crate::error::RecognizeError;
use crate::postprocess::clean_transcription;
use crate::prompts::WARM_UP_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A vision model reached through an `edgequake-llm` provider.
pub struct VisionModelRecognizer {
    name: String,
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl VisionModelRecognizer {
    /// Wrap an already constructed provider.
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>, config: &HandlerConfig) -> Self {
        Self {
            name: name.into(),
            provider,
            system_prompt: config.system_prompt.clone(),
            options: build_options(config),
        }
    }

    /// Construct the provider for `spec` via [`ProviderFactory`].
    ///
    /// Credentials and endpoints are read from the environment by the
    /// provider itself (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, ...).
    pub fn connect(spec: &ModelSpec, config: &HandlerConfig) -> Result<Self, RecognizeError> {
        let provider = ProviderFactory::create_llm_provider(&spec.provider, &spec.model)
            .map_err(|e| RecognizeError::Provider(format!("{e}")))?;
        Ok(Self::new(spec.to_string(), provider, config))
    }

    /// Confirm the model answers a text-only request.
    pub async fn warm_up(&self) -> Result<(), RecognizeError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(WARM_UP_PROMPT, Vec::new())];
        let options = CompletionOptions {
            max_tokens: Some(8),
            temperature: Some(0.0),
            ..Default::default()
        };
        self.provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| RecognizeError::Provider(format!("{e}")))?;
        debug!("{}: warm-up answered in {:?}", self.name, start.elapsed());
        Ok(())
    }
}

#[async_trait]
impl Recognizer for VisionModelRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, image: &DynamicImage, prompt: &str) -> Result<String, RecognizeError> {
        let start = Instant::now();
        let image_data = encode::to_image_data(image)?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(prompt, vec![image_data]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| RecognizeError::Provider(format!("{e}")))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(clean_transcription(&response.content))
    }
}

/// Build `CompletionOptions` from the handler config.
fn build_options(config: &HandlerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
