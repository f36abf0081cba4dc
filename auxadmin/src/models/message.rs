//! Message model representing one turn in a chat session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the end user.
    User,
    /// Message from the assistant.
    Assistant,
}

impl MessageRole {
    /// Convert role to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse role from its wire/database string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a chat session.
///
/// Messages are append-only except for the override mutation: an admin may
/// replace the displayed content of an assistant message, in which case the
/// pre-override text is kept in `original_content` for audit and never
/// changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier within the session.
    pub id: String,
    /// Role of the message sender.
    pub role: MessageRole,
    /// Displayed content (post-override, if any).
    pub content: String,
    /// Whether an admin has overridden the content.
    pub overridden: bool,
    /// Content as originally produced, set on first override only.
    pub original_content: Option<String>,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new, un-overridden message.
    pub fn new(id: String, role: MessageRole, content: String) -> Self {
        Self {
            id,
            role,
            content,
            overridden: false,
            original_content: None,
            created_at: Utc::now(),
        }
    }
}
