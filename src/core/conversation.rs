//! Per-panel conversation history.
//!
//! A [`ConversationStore`] always holds at least one conversation and always
//! has exactly one of them active. Operations that would break either rule
//! repair it in place (deleting the last conversation creates a fresh one,
//! switching to an unknown id falls back to the first).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::core::ids::ConversationId;
use crate::core::message::Message;

pub const DEFAULT_CONVERSATION_NAME: &str = "New Conversation";

const AUTO_NAME_GRAPHEMES: usize = 30;

/// Name derived from the first user message: the first 30 grapheme clusters
/// followed by `...` when the text is longer than that.
pub fn derive_name(text: &str) -> String {
    let trimmed = text.trim();
    let graphemes: Vec<&str> = trimmed.graphemes(true).collect();
    if graphemes.len() > AUTO_NAME_GRAPHEMES {
        format!("{}...", graphemes[..AUTO_NAME_GRAPHEMES].concat())
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    name: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    /// Set by an explicit rename; stops the name from being auto-derived.
    #[serde(default)]
    renamed: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::generate(),
            name: DEFAULT_CONVERSATION_NAME.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
            renamed: false,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_renamed(&self) -> bool {
        self.renamed
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: Message) {
        let first_user_message =
            message.is_user() && !self.messages.iter().any(Message::is_user);
        if first_user_message && !self.renamed {
            let derived = derive_name(message.content());
            if !derived.is_empty() {
                self.name = derived;
            }
        }
        self.messages.push(message);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: ConversationId,
}

impl ConversationStore {
    pub fn new() -> Self {
        let conversation = Conversation::new();
        let active = conversation.id.clone();
        Self {
            conversations: vec![conversation],
            active,
        }
    }

    /// Rebuild a store from persisted parts, restoring both invariants.
    pub fn from_parts(
        mut conversations: Vec<Conversation>,
        active: Option<ConversationId>,
    ) -> Self {
        if conversations.is_empty() {
            conversations.push(Conversation::new());
        }
        let active = active
            .filter(|id| conversations.iter().any(|c| &c.id == id))
            .unwrap_or_else(|| conversations[0].id.clone());
        Self {
            conversations,
            active,
        }
    }

    /// Start a new conversation at the top of the list and make it active.
    pub fn create(&mut self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active = id.clone();
        id
    }

    /// Activate `id`. Unknown ids activate the first conversation and return
    /// false.
    pub fn switch(&mut self, id: &ConversationId) -> bool {
        if self.position(id).is_some() {
            self.active = id.clone();
            true
        } else {
            self.active = self.conversations[0].id.clone();
            false
        }
    }

    pub fn clear(&mut self, id: &ConversationId) -> bool {
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.messages.clear();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &ConversationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.conversations.remove(index);
        if self.conversations.is_empty() {
            self.conversations.push(Conversation::new());
        }
        if &self.active == id {
            self.active = self.conversations[0].id.clone();
        }
        true
    }

    pub fn append_message(&mut self, id: &ConversationId, message: Message) -> bool {
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.push(message);
                true
            }
            None => false,
        }
    }

    /// Blank names are rejected.
    pub fn rename(&mut self, id: &ConversationId, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.name = name.to_string();
                conversation.renamed = true;
                true
            }
            None => false,
        }
    }

    pub fn active_id(&self) -> &ConversationId {
        &self.active
    }

    pub fn active(&self) -> &Conversation {
        self.get(&self.active)
            .unwrap_or(&self.conversations[0])
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter()
    }

    fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
