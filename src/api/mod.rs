//! Wire payloads for the OpenAI-compatible endpoints served by LM Studio.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: Option<ChatResponseDelta>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One streamed completion event. Servers are not uniform about where the
/// text lives, so every known location is optional.
#[derive(Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatResponse {
    /// Text carried by this event, checking the streaming delta first.
    pub fn delta_text(&self) -> Option<&str> {
        let choice = self.choices.first();
        choice
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_deref())
            .or_else(|| choice.and_then(|c| c.text.as_deref()))
            .or_else(|| {
                choice
                    .and_then(|c| c.message.as_ref())
                    .and_then(|m| m.content.as_deref())
            })
            .or(self.content.as_deref())
            .or(self.text.as_deref())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub object: Option<String>,
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// A model offered in the pickers: the server id plus a short display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
}

impl ModelEntry {
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = models::display_name(&id);
        Self { id, name }
    }
}

impl From<&ModelInfo> for ModelEntry {
    fn from(info: &ModelInfo) -> Self {
        Self::from_id(info.id.clone())
    }
}

pub mod models;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ChatResponse {
        serde_json::from_str(json).expect("valid response")
    }

    #[test]
    fn delta_text_checks_each_known_shape() {
        assert_eq!(
            parse(r#"{"choices":[{"delta":{"content":"a"}}]}"#).delta_text(),
            Some("a")
        );
        assert_eq!(parse(r#"{"choices":[{"text":"b"}]}"#).delta_text(), Some("b"));
        assert_eq!(
            parse(r#"{"choices":[{"message":{"content":"c"}}]}"#).delta_text(),
            Some("c")
        );
        assert_eq!(parse(r#"{"content":"d"}"#).delta_text(), Some("d"));
        assert_eq!(parse(r#"{"text":"e"}"#).delta_text(), Some("e"));
        assert_eq!(
            parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).delta_text(),
            None
        );
    }

    #[test]
    fn chat_request_serializes_generation_parameters() {
        let request = ChatRequest {
            model: "qwen2.5-7b".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            stream: true,
            temperature: 0.5,
            max_tokens: 2000,
            top_p: None,
            frequency_penalty: Some(0.2),
            presence_penalty: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "qwen2.5-7b");
        assert_eq!(value["stream"], true);
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["max_tokens"], 2000);
        assert_eq!(value["messages"][0]["role"], "user");
        assert!((value["frequency_penalty"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!(value.get("top_p").is_none());
        assert!(value.get("presence_penalty").is_none());
    }
}
