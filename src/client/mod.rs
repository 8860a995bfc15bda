//! Completion-service abstraction shared by both model-backed stages.
//!
//! The stages only ever need one thing from a model: "here is a request,
//! give me the text of the answer". [`CompletionClient`] captures exactly
//! that, which keeps timeouts, retries and the choice of backend out of the
//! conversion logic:
//!
//! ```text
//! stage ──▶ RetryingClient ──▶ MessagesClient   (Bedrock / messages endpoint)
//!                         └──▶ ProviderClient   (any edgequake-llm provider)
//!                         └──▶ ScriptedClient   (canned replies for tests)
//! ```
//!
//! The request types below serialise to the messages wire format: a list of
//! role-tagged turns whose content is a list of typed parts (plain text, or
//! an image given as a media type plus a base64 payload).

use crate::error::FlowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod messages;
pub mod provider;
pub mod retry;
pub mod scripted;

pub use messages::MessagesClient;
pub use provider::ProviderClient;
pub use retry::{RetryPolicy, RetryingClient};
pub use scripted::ScriptedClient;

/// A service that turns a [`CompletionRequest`] into the model's answer text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one request and return the text of the first content part.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FlowError>;
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Conversation turns, oldest first.
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// A request made of a single user turn.
    pub fn single_turn(content: Vec<ContentPart>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
            messages: vec![Message {
                role: Role::User,
                content,
            }],
        }
    }

    /// Concatenated text of every text part, in order. Handy for logging and tests.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of image parts across all turns.
    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter(|part| matches!(part, ContentPart::Image { .. }))
            .count()
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// One typed part of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// An inline image given as base64 data.
    pub fn base64_image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentPart::Image {
            source: ImageSource {
                kind: "base64".to_string(),
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }
}

/// Inline image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Always `"base64"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

/// Response envelope of the messages endpoint. Only `content` is read.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// One content block of a response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl CompletionResponse {
    /// Text of the first content block, if it has any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|b| b.text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn image_part_serialises_to_wire_format() {
        let part = ContentPart::base64_image("image/png", "QUJD");
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "QUJD"}
            })
        );
    }

    #[test]
    fn single_turn_request_shape() {
        let req = CompletionRequest::single_turn(vec![ContentPart::text("hi")], 2000, 0.2);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["max_tokens"], 2000);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"][0], json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn prompt_text_skips_images() {
        let req = CompletionRequest::single_turn(
            vec![
                ContentPart::text("read this"),
                ContentPart::base64_image("image/png", "AAAA"),
            ],
            10,
            0.0,
        );
        assert_eq!(req.prompt_text(), "read this");
        assert_eq!(req.image_count(), 1);
    }

    #[test]
    fn response_first_text() {
        let resp: CompletionResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "{\"a\":1}"}, {"type": "text", "text": "ignored"}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(resp.first_text(), Some("{\"a\":1}"));

        let empty: CompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.first_text(), None);
    }
}
