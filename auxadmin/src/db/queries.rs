//! Database query implementations.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::AdminError;
use crate::models::{Analytics, ChatMessage, ChatSession, MessageRole, SessionStatus, TopQuestion};

/// Parse a timestamp string flexibly from various formats.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common SQLite datetime format: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    anyhow::bail!("Invalid timestamp format: {s}")
}

/// Current time in storage format.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Check whether a session row exists.
fn session_exists(conn: &Connection, id: &str) -> Result<bool, AdminError> {
    let row = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id], |_| {
            Ok(())
        })
        .optional()?;
    Ok(row.is_some())
}

/// Bump a session's updated_at to the given timestamp.
fn touch_session(conn: &Connection, id: &str, timestamp: &str) -> Result<(), AdminError> {
    conn.execute(
        "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
        params![timestamp, id],
    )?;
    Ok(())
}

/// Queries for the sessions table.
pub struct SessionQueries;

impl SessionQueries {
    /// Insert a new session (intake path; the admin surface never creates
    /// sessions itself).
    pub fn insert(conn: &Connection, session: &ChatSession) -> Result<(), AdminError> {
        conn.execute(
            r"INSERT INTO sessions (id, status, notes, user_agent, ip, created_at, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.status.as_str(),
                session.notes,
                session.user_agent,
                session.ip,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a session by ID, messages included.
    pub fn get(conn: &Connection, id: &str) -> Result<ChatSession, AdminError> {
        let mut stmt = conn.prepare(
            r"SELECT id, status, notes, user_agent, ip, created_at, updated_at
              FROM sessions WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| Ok(Self::row_to_session(row)));

        match result {
            Ok(session) => {
                let mut session = session?;
                session.messages = MessageQueries::list_for_session(conn, id)?;
                Ok(session)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(AdminError::NotFound(format!("session {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List sessions most-recent-first by updated_at, optionally filtered by
    /// status, with offset/limit paging. Messages are included.
    pub fn list(
        conn: &Connection,
        limit: usize,
        offset: usize,
        status: Option<SessionStatus>,
    ) -> Result<Vec<ChatSession>, AdminError> {
        let limit = i64::try_from(limit).context("limit out of range")?;
        let offset = i64::try_from(offset).context("offset out of range")?;

        let mut sessions = Vec::new();

        if let Some(s) = status {
            let mut stmt = conn.prepare(
                r"SELECT id, status, notes, user_agent, ip, created_at, updated_at
                  FROM sessions WHERE status = ?1
                  ORDER BY updated_at DESC, id
                  LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![s.as_str(), limit, offset], |row| {
                Ok(Self::row_to_session(row))
            })?;
            for row in rows {
                sessions.push(row??);
            }
        } else {
            let mut stmt = conn.prepare(
                r"SELECT id, status, notes, user_agent, ip, created_at, updated_at
                  FROM sessions
                  ORDER BY updated_at DESC, id
                  LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, offset], |row| Ok(Self::row_to_session(row)))?;
            for row in rows {
                sessions.push(row??);
            }
        }

        for session in &mut sessions {
            session.messages = MessageQueries::list_for_session(conn, &session.id)?;
        }

        Ok(sessions)
    }

    /// Update session status, and notes if provided.
    pub fn update_status(
        conn: &Connection,
        id: &str,
        status: SessionStatus,
        notes: Option<&str>,
    ) -> Result<(), AdminError> {
        let now = now_rfc3339();
        let affected = if let Some(notes) = notes {
            conn.execute(
                "UPDATE sessions SET status = ?1, notes = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), notes, now, id],
            )?
        } else {
            conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id],
            )?
        };

        if affected == 0 {
            return Err(AdminError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    /// Flag a session for review, recording the reason in notes.
    pub fn flag(conn: &Connection, id: &str, reason: &str) -> Result<(), AdminError> {
        if reason.trim().is_empty() {
            return Err(AdminError::InvalidRequest("reason required".to_string()));
        }
        Self::update_status(conn, id, SessionStatus::Flagged, Some(reason))
    }

    /// Delete a session and its messages. Deleting an unknown id is a
    /// silent success; returns whether a row was actually removed.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool, AdminError> {
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Convert a row to a `ChatSession` (without messages).
    fn row_to_session(row: &rusqlite::Row<'_>) -> Result<ChatSession, AdminError> {
        let status_str: String = row.get(1)?;
        let status = SessionStatus::from_str(&status_str)
            .with_context(|| format!("Invalid session status: {status_str}"))?;

        let created_at_str: String = row.get(5)?;
        let created_at = parse_timestamp(&created_at_str)?;

        let updated_at_str: String = row.get(6)?;
        let updated_at = parse_timestamp(&updated_at_str)?;

        Ok(ChatSession {
            id: row.get(0)?,
            status,
            notes: row.get(2)?,
            user_agent: row.get(3)?,
            ip: row.get(4)?,
            created_at,
            updated_at,
            messages: Vec::new(),
        })
    }
}

/// Queries for the messages table.
pub struct MessageQueries;

impl MessageQueries {
    /// Append a message to a session (intake path) and bump the session's
    /// updated_at.
    pub fn append(
        conn: &Connection,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, AdminError> {
        if content.trim().is_empty() {
            return Err(AdminError::InvalidRequest("content required".to_string()));
        }
        if !session_exists(conn, session_id)? {
            return Err(AdminError::NotFound(format!("session {session_id}")));
        }

        let message = ChatMessage::new(
            Uuid::now_v7().to_string(),
            role,
            content.to_string(),
        );
        let created_at = message.created_at.to_rfc3339();

        conn.execute(
            r"INSERT INTO messages (id, session_id, role, content, overridden, original_content, created_at)
              VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)",
            params![
                message.id,
                session_id,
                message.role.as_str(),
                message.content,
                created_at,
            ],
        )?;
        touch_session(conn, session_id, &created_at)?;

        Ok(message)
    }

    /// List messages for a session in chronological order.
    pub fn list_for_session(
        conn: &Connection,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, AdminError> {
        let mut stmt = conn.prepare(
            r"SELECT id, role, content, overridden, original_content, created_at
              FROM messages WHERE session_id = ?1
              ORDER BY created_at ASC, id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| Ok(Self::row_to_message(row)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    /// Replace the displayed content of an assistant message.
    ///
    /// The first override copies the current content into original_content;
    /// later overrides replace content only, so the audit copy is immutable.
    pub fn override_content(
        conn: &Connection,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), AdminError> {
        if content.trim().is_empty() {
            return Err(AdminError::InvalidRequest("content required".to_string()));
        }
        if !session_exists(conn, session_id)? {
            return Err(AdminError::NotFound(format!("session {session_id}")));
        }

        let row = conn
            .query_row(
                "SELECT role, overridden FROM messages WHERE id = ?1 AND session_id = ?2",
                params![message_id, session_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;

        let Some((role_str, overridden)) = row else {
            return Err(AdminError::NotFound(format!("message {message_id}")));
        };

        let role = MessageRole::from_str(&role_str)
            .with_context(|| format!("Invalid message role: {role_str}"))?;
        if role != MessageRole::Assistant {
            return Err(AdminError::InvalidRequest(
                "only assistant messages can be overridden".to_string(),
            ));
        }

        if overridden {
            conn.execute(
                "UPDATE messages SET content = ?1 WHERE id = ?2",
                params![content, message_id],
            )?;
        } else {
            conn.execute(
                r"UPDATE messages
                  SET original_content = content, overridden = 1, content = ?1
                  WHERE id = ?2",
                params![content, message_id],
            )?;
        }
        touch_session(conn, session_id, &now_rfc3339())?;

        Ok(())
    }

    /// Convert a row to a `ChatMessage`.
    fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ChatMessage, AdminError> {
        let role_str: String = row.get(1)?;
        let role = MessageRole::from_str(&role_str)
            .with_context(|| format!("Invalid message role: {role_str}"))?;

        let created_at_str: String = row.get(5)?;
        let created_at = parse_timestamp(&created_at_str)?;

        Ok(ChatMessage {
            id: row.get(0)?,
            role,
            content: row.get(2)?,
            overridden: row.get(3)?,
            original_content: row.get(4)?,
            created_at,
        })
    }
}

/// Derived analytics over the full session set.
pub struct AnalyticsQueries;

impl AnalyticsQueries {
    /// Number of top questions reported.
    const TOP_QUESTIONS: usize = 5;

    /// Compute the analytics snapshot at call time. Full scan; nothing is
    /// maintained incrementally.
    pub fn compute(conn: &Connection) -> Result<Analytics, AdminError> {
        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let total_messages: i64 =
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let flagged_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE status = 'flagged'",
            [],
            |row| row.get(0),
        )?;

        let avg_messages_per_session = if total_sessions == 0 {
            0.0
        } else {
            total_messages as f64 / total_sessions as f64
        };

        let mut stmt = conn.prepare(
            r"SELECT lower(trim(content)) AS question, COUNT(*) AS n
              FROM messages WHERE role = 'user'
              GROUP BY question
              ORDER BY n DESC, question ASC
              LIMIT ?1",
        )?;
        let rows = stmt.query_map(
            params![i64::try_from(Self::TOP_QUESTIONS).context("limit out of range")?],
            |row| {
                Ok(TopQuestion {
                    question: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            },
        )?;

        let mut top_questions = Vec::new();
        for row in rows {
            top_questions.push(row?);
        }

        Ok(Analytics {
            total_sessions: total_sessions as u64,
            total_messages: total_messages as u64,
            flagged_count: flagged_count as u64,
            avg_messages_per_session,
            top_questions,
        })
    }
}
