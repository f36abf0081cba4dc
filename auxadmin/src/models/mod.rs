//! Data models for auxadmin entities.

mod analytics;
mod message;
mod session;

pub use analytics::{Analytics, TopQuestion};
pub use message::{ChatMessage, MessageRole};
pub use session::{ChatSession, SessionStatus};
