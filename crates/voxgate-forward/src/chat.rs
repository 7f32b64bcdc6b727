//! OpenAI-compatible chat-completion wire types.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Request body. Optional fields are left out of the JSON entirely so that
/// upstreams with strict schemas see only what was set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ChatRequest {
    /// A single user turn with no sampling overrides.
    pub fn user(content: impl Into<String>, model: Option<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: "user",
                content: content.into(),
            }],
            model,
            max_tokens: None,
            temperature: None,
            top_p: None,
        }
    }
}

/// Pulls the reply text out of a decoded response body.
///
/// Looks at `choices[0].message.content` first, then a top-level string
/// `response` field (the shape some self-hosted servers return). The text
/// is trimmed; `None` means neither field holds a string.
pub fn extract_reply(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .or_else(|| body.get("response").and_then(Value::as_str))
        .map(|text| text.trim().to_string())
}
