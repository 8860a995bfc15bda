//! Completion client backed by an `edgequake-llm` provider.
//!
//! Lets either stage run against any provider the edgequake-llm factory
//! knows (OpenAI, Anthropic, Gemini, Azure, Ollama, …) instead of the
//! messages endpoint. Text parts of a turn are joined with blank lines and
//! image parts are forwarded as [`ImageData`] attachments.

use super::{CompletionClient, CompletionRequest, ContentPart, Role};
use crate::error::FlowError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Instantiate a named provider with the given model.
    ///
    /// The provider reads its API key (`OPENAI_API_KEY`, …) from the environment.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, FlowError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            FlowError::InvalidConfig(format!(
                "LLM provider '{provider_name}' could not be created: {e}"
            ))
        })?;
        Ok(Self::new(provider))
    }
}

/// Translate request turns into provider chat messages.
fn to_chat_messages(request: &CompletionRequest) -> Result<Vec<ChatMessage>, FlowError> {
    request
        .messages
        .iter()
        .map(|message| {
            if message.role != Role::User {
                return Err(FlowError::InvalidConfig(
                    "provider backend only supports user turns".into(),
                ));
            }
            let mut texts = Vec::new();
            let mut images = Vec::new();
            for part in &message.content {
                match part {
                    ContentPart::Text { text } => texts.push(text.as_str()),
                    ContentPart::Image { source } => images.push(ImageData::new(
                        source.data.clone(),
                        source.media_type.as_str(),
                    )),
                }
            }
            let text = texts.join("\n\n");
            Ok(ChatMessage::user_with_images(&text, images))
        })
        .collect()
}

#[async_trait]
impl CompletionClient for ProviderClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FlowError> {
        let messages = to_chat_messages(request)?;
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens as usize),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| FlowError::ServiceError {
                status: None,
                message: e.to_string(),
            })?;

        debug!(
            "Provider returned {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(FlowError::ServiceError {
                status: None,
                message: "provider returned an empty completion".into(),
            });
        }
        Ok(response.content)
    }
}
