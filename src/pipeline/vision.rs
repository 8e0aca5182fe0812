//! Vision-model transcription: the fallback for pages OCR reads poorly.
//!
//! [`VisionTranscriber`] is the seam; [`LlmTranscriber`] drives any
//! `edgequake-llm` provider (OpenAI, Anthropic, Gemini, Ollama, …).
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads retries out: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s.

use crate::config::VisionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without a model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("vision call failed after {retries} retries: {detail}")]
    Exhausted { retries: u32, detail: String },
}

/// A page transcription.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    pub text: String,
    /// Retries needed before the call succeeded.
    pub retries: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Turns a page image into text.
#[async_trait]
pub trait VisionTranscriber: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe one page. `instruction` is forwarded to the model as-is.
    async fn transcribe(
        &self,
        image: &DynamicImage,
        page: usize,
        instruction: &str,
    ) -> Result<Transcription, VisionError>;
}

/// [`VisionTranscriber`] over an `edgequake-llm` provider.
pub struct LlmTranscriber {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmTranscriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &VisionConfig) -> Self {
        let label = match (&config.provider_name, &config.model) {
            (Some(p), Some(m)) => format!("{p}/{m}"),
            (Some(p), None) => p.clone(),
            (None, Some(m)) => m.clone(),
            (None, None) => "llm".to_string(),
        };
        Self {
            provider,
            label,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1)))
    }
}

#[async_trait]
impl VisionTranscriber for LlmTranscriber {
    fn name(&self) -> &str {
        &self.label
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: the transcription instruction
    /// 2. **User message**: the page PNG as a base64 image attachment (empty text)
    async fn transcribe(
        &self,
        image: &DynamicImage,
        page: usize,
        instruction: &str,
    ) -> Result<Transcription, VisionError> {
        let start = Instant::now();
        let image_data =
            encode::encode_page(image).map_err(|e| VisionError::Encode(e.to_string()))?;

        let messages = vec![
            ChatMessage::system(instruction),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = self.options();

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                warn!(
                    "Page {}: vision retry {}/{} after {}ms",
                    page,
                    attempt,
                    self.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(Transcription {
                        text: response.content,
                        retries: attempt,
                        input_tokens: response.prompt_tokens as usize,
                        output_tokens: response.completion_tokens as usize,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    warn!("Page {}: vision attempt {} failed: {}", page, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(VisionError::Exhausted {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build the transcriber for a run, or `None` when vision is disabled.
///
/// Enabled but unresolvable is a configuration error, reported before any
/// page is processed.
pub fn build_transcriber(
    config: &VisionConfig,
) -> Result<Option<Arc<dyn VisionTranscriber>>, ExtractError> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(ref t) = config.transcriber {
        return Ok(Some(Arc::clone(t)));
    }
    let provider = resolve_provider(config)?;
    Ok(Some(Arc::new(LlmTranscriber::new(provider, config))))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`OPENAI_API_KEY`** present: OpenAI with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &VisionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Vision fallback is enabled but no LLM provider could be auto-detected.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl VisionTranscriber for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn transcribe(
            &self,
            _image: &DynamicImage,
            page: usize,
            instruction: &str,
        ) -> Result<Transcription, VisionError> {
            Ok(Transcription {
                text: format!("{page}:{instruction}"),
                ..Default::default()
            })
        }
    }

    #[test]
    fn disabled_builds_nothing() {
        let cfg = VisionConfig::default();
        assert!(build_transcriber(&cfg).unwrap().is_none());
    }

    #[tokio::test]
    async fn explicit_transcriber_wins() {
        let cfg = VisionConfig {
            enabled: true,
            transcriber: Some(Arc::new(Echo)),
            ..VisionConfig::default()
        };
        let t = build_transcriber(&cfg).unwrap().expect("enabled");
        assert_eq!(t.name(), "echo");
        let out = t
            .transcribe(&DynamicImage::new_luma8(2, 2), 4, "read it")
            .await
            .unwrap();
        assert_eq!(out.text, "4:read it");
    }

    #[test]
    fn exhausted_error_mentions_retries() {
        let e = VisionError::Exhausted {
            retries: 3,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("3 retries"));
    }
}
