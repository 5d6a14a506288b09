//! Opaque identifiers for panels, conversations, and messages.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

const RANDOM_ID_BYTES: usize = 12;

/// Random URL-safe token used for conversation and message ids.
///
/// Falls back to a clock-derived token if the OS entropy source is
/// unavailable; ids only need to be unique within one panel's history.
pub fn random_token() -> String {
    let mut bytes = [0_u8; RANDOM_ID_BYTES];
    if getrandom::fill(&mut bytes).is_err() {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes();
        bytes[..nanos.len()].copy_from_slice(&nanos);
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identity of one chat panel. Stable across restarts so persisted state
    /// can be found again (`panel-1`, `panel-2`, ...).
    PanelId
);

string_id!(ConversationId);

string_id!(MessageId);

impl PanelId {
    pub fn numbered(index: usize) -> Self {
        Self(format!("panel-{index}"))
    }
}

impl ConversationId {
    pub fn generate() -> Self {
        Self(random_token())
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(random_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_url_safe_and_distinct() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn panel_ids_serialize_as_plain_strings() {
        let id = PanelId::numbered(2);
        assert_eq!(id.as_str(), "panel-2");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"panel-2\"");
    }
}
