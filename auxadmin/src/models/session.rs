//! Session model representing a support-chat conversation under moderation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChatMessage;

/// Moderation status of a chat session.
///
/// Any status is reachable from any other; transitions are driven entirely
/// by admin actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Conversation is ongoing or awaiting review.
    Active,
    /// An admin closed the session as handled.
    Resolved,
    /// An admin marked the session for review.
    Flagged,
}

impl SessionStatus {
    /// Convert status to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Flagged => "flagged",
        }
    }

    /// Parse status from its wire/database string. Strict: unknown strings
    /// are rejected so invalid states stay unrepresentable.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "flagged" => Some(Self::Flagged),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A support-chat session tracked for moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier.
    pub id: String,
    /// Current moderation status.
    pub status: SessionStatus,
    /// Free-text admin notes (flag reasons land here too).
    pub notes: Option<String>,
    /// User agent reported by the chat client.
    pub user_agent: Option<String>,
    /// Client IP as seen at intake.
    pub ip: Option<String>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last touched (message append or admin edit).
    pub updated_at: DateTime<Utc>,
    /// Messages in chronological order.
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Create a new empty session with default values.
    pub fn new(id: String, user_agent: Option<String>, ip: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: SessionStatus::Active,
            notes: None,
            user_agent,
            ip,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }
}
