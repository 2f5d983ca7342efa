//! Hosted-model calls through an `edgequake_llm` provider.
//!
//! Exactly one attempt is made per request. The collaborator-level timeout
//! (`api_timeout_secs`) bounds the wait; a timeout is reported as
//! [`EngineError::Timeout`] and never retried.

use super::{HostedModel, ModelReply, ModelRequest};
use crate::config::ExtractionConfig;
use crate::error::EngineError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// [`HostedModel`] over any [`LLMProvider`] (OpenAI, Anthropic, Gemini,
/// Ollama, …).
#[derive(Clone)]
pub struct LlmModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl std::fmt::Debug for LlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmModel")
            .field("label", &self.label)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmModel {
    /// Wrap a provider. `label` is reported in logs and in the result
    /// (typically `provider/model`).
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }

    async fn call(&self, request: ModelRequest) -> Result<ModelReply, EngineError> {
        let start = Instant::now();

        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.prompt.as_str(),
                request.images,
            ));
        }

        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| EngineError::Timeout {
            engine: self.label.clone(),
            secs: self.timeout_secs,
        })?
        .map_err(|e| EngineError::Failed {
            engine: self.label.clone(),
            detail: e.to_string(),
        })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

impl HostedModel for LlmModel {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelReply, EngineError>> {
        Box::pin(self.call(request))
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
