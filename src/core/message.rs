use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ChatMessage, ModelEntry};
use crate::core::ids::{MessageId, PanelId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    /// Failure report rendered in the conversation. The server protocol has no
    /// such role, so these travel as `assistant` turns.
    Error,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
        }
    }

    pub fn to_api_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant | Role::Error => "assistant",
        }
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "error" => Ok(Role::Error),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Provenance attached to messages produced by a model or delivered by relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_panel: Option<PanelId>,
    #[serde(default)]
    pub iteration_count: u32,
}

impl MessageMetadata {
    pub fn for_model(model: &ModelEntry) -> Self {
        Self {
            model_id: Some(model.id.clone()),
            model_name: Some(model.name.clone()),
            ..Self::default()
        }
    }
}

/// One entry of a conversation log. Immutable once appended: there is no
/// mutating accessor, edits are new messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> Option<&MessageMetadata> {
        self.metadata.as_ref()
    }

    pub fn iteration_count(&self) -> u32 {
        self.metadata
            .as_ref()
            .map(|meta| meta.iteration_count)
            .unwrap_or(0)
    }

    pub fn from_panel(&self) -> Option<&PanelId> {
        self.metadata.as_ref().and_then(|meta| meta.from_panel.as_ref())
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Error
    }

    pub fn to_api_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.to_api_role().to_string(),
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_sent_as_assistant_turns() {
        let message = Message::error("Unable to get response");
        let api = message.to_api_message();
        assert_eq!(api.role, "assistant");
        assert_eq!(api.content, "Unable to get response");
        assert_eq!(message.role(), "error");
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("system").is_err());
        assert!(serde_json::from_str::<Role>("\"tool\"").is_err());
        assert_eq!(serde_json::from_str::<Role>("\"error\"").unwrap(), Role::Error);
    }

    #[test]
    fn iteration_count_defaults_to_zero_without_metadata() {
        let message = Message::user("hi");
        assert_eq!(message.iteration_count(), 0);
        assert!(message.from_panel().is_none());

        let relayed = Message::user("hi").with_metadata(MessageMetadata {
            from_panel: Some(PanelId::from("panel-2")),
            iteration_count: 3,
            ..MessageMetadata::default()
        });
        assert_eq!(relayed.iteration_count(), 3);
        assert_eq!(relayed.from_panel().map(PanelId::as_str), Some("panel-2"));
    }
}
