//! Plain-text conversation export.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::core::conversation::Conversation;
use crate::core::message::{Message, Role};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn speaker(message: &Message) -> String {
    match message.role() {
        Role::User => "Human".to_string(),
        Role::Assistant => match message.metadata().and_then(|m| m.model_name.as_deref()) {
            Some(model) => format!("Assistant ({model})"),
            None => "Assistant".to_string(),
        },
        Role::Error => "Error".to_string(),
    }
}

/// `[timestamp] Speaker:` header, the content, then a blank line.
pub fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}:\n{}\n\n",
        message.timestamp().format(TIMESTAMP_FORMAT),
        speaker(message),
        message.content()
    )
}

pub fn export_conversation(conversation: &Conversation) -> String {
    conversation
        .messages()
        .iter()
        .map(format_message)
        .collect()
}

/// Every conversation under a `=== Conversation: name ===` header.
pub fn export_conversations<'a>(conversations: impl IntoIterator<Item = &'a Conversation>) -> String {
    let mut out = String::new();
    for conversation in conversations {
        let _ = writeln!(out, "=== Conversation: {} ===\n", conversation.name());
        out.push_str(&export_conversation(conversation));
        out.push('\n');
    }
    out
}

pub fn write_export(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}
