//! Derived analytics over the full session set.

use serde::{Deserialize, Serialize};

/// A frequently asked user question with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopQuestion {
    /// Normalized (lowercased, trimmed) question text.
    pub question: String,
    /// Number of times it was asked.
    pub count: u64,
}

/// Aggregate snapshot computed on read; nothing here is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub flagged_count: u64,
    pub avg_messages_per_session: f64,
    /// Most frequent user messages, highest count first.
    pub top_questions: Vec<TopQuestion>,
}
