//! CLI command execution.
//!
//! This is a thin client - all store operations go through the server.

use anyhow::{bail, Context, Result};

use crate::config::{AuthConfig, Config};
use crate::models::{Analytics, ChatSession, SessionStatus};
use crate::server;

use super::args::{Cli, Commands};

// === HTTP Client for Server Communication ===

/// Response from listing sessions.
#[derive(Debug, serde::Deserialize)]
struct ListResponse {
    sessions: Vec<ChatSession>,
    count: usize,
}

/// Response from a moderation action.
#[derive(Debug, serde::Deserialize)]
struct ActionResponse {
    #[allow(dead_code)]
    success: bool,
    message: String,
}

/// Log in and return the admin session cookie pair (`name=value`).
async fn login(port: u16, password: &str) -> Result<String> {
    let url = format!("http://127.0.0.1:{port}/api/auth");
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "password": password }))
        .send()
        .await
        .context("Failed to reach admin server")?;

    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
        bail!("Invalid admin password (set ADMIN_PASSWORD or pass --password)");
    }
    if !resp.status().is_success() {
        bail!("Server returned {}", resp.status());
    }

    let cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .context("Server did not set a session cookie")?
        .to_str()?
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string();
    Ok(cookie)
}

/// Ensure the server is up and return an authenticated connection.
async fn connect(password: Option<String>) -> Result<(u16, String)> {
    let port = server::ensure_server_running()?;
    let password = password.unwrap_or_else(|| AuthConfig::from_env().admin_password);
    let cookie = login(port, &password).await?;
    Ok((port, cookie))
}

async fn bail_on_error(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    bail!(
        "Server returned {status}: {}",
        body["error"].as_str().unwrap_or("unknown error")
    );
}

/// Fetch sessions from the server.
async fn get_sessions(
    port: u16,
    cookie: &str,
    limit: usize,
    offset: usize,
    status: Option<SessionStatus>,
) -> Result<ListResponse> {
    let mut url = format!("http://127.0.0.1:{port}/api/sessions?limit={limit}&offset={offset}");
    if let Some(s) = status {
        url = format!("{url}&status={}", urlencoding::encode(s.as_str()));
    }

    let resp = reqwest::Client::new()
        .get(&url)
        .header(reqwest::header::COOKIE, cookie)
        .send()
        .await
        .context("Failed to list sessions")?;

    let resp = bail_on_error(resp).await?;
    resp.json().await.context("Failed to parse sessions")
}

/// Fetch a single session from the server.
async fn get_session(port: u16, cookie: &str, id: &str) -> Result<ChatSession> {
    let url = format!(
        "http://127.0.0.1:{port}/api/sessions/{}",
        urlencoding::encode(id)
    );

    let resp = reqwest::Client::new()
        .get(&url)
        .header(reqwest::header::COOKIE, cookie)
        .send()
        .await
        .context("Failed to get session")?;

    let resp = bail_on_error(resp).await?;
    resp.json().await.context("Failed to parse session")
}

/// Run a moderation action on the server.
async fn post_action(
    port: u16,
    cookie: &str,
    body: &serde_json::Value,
) -> Result<ActionResponse> {
    let url = format!("http://127.0.0.1:{port}/api/sessions/action");

    let resp = reqwest::Client::new()
        .post(&url)
        .header(reqwest::header::COOKIE, cookie)
        .json(body)
        .send()
        .await
        .context("Failed to run action")?;

    let resp = bail_on_error(resp).await?;
    resp.json().await.context("Failed to parse response")
}

/// Fetch the analytics snapshot from the server.
async fn get_analytics(port: u16, cookie: &str) -> Result<Analytics> {
    let url = format!("http://127.0.0.1:{port}/api/analytics");

    let resp = reqwest::Client::new()
        .get(&url)
        .header(reqwest::header::COOKIE, cookie)
        .send()
        .await
        .context("Failed to get analytics")?;

    let resp = bail_on_error(resp).await?;
    resp.json().await.context("Failed to parse analytics")
}

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    let Cli { password, command } = cli;

    match command {
        Commands::Serve { port, open, db } => {
            let config = Config::load(port, db)?;
            server::start_server(config, open).await
        }
        Commands::List {
            status,
            limit,
            offset,
        } => list_sessions(password, status.map(Into::into), limit, offset).await,
        Commands::Show { id } => show_session(password, &id).await,
        Commands::Status { id, status, notes } => {
            update_status(password, &id, status.into(), notes).await
        }
        Commands::Flag { id, reason } => {
            let reason = reason.join(" ");
            if reason.is_empty() {
                bail!("Reason is required for flag command");
            }
            flag_session(password, &id, &reason).await
        }
        Commands::Override {
            session_id,
            message_id,
            content,
        } => {
            let content = content.join(" ");
            if content.is_empty() {
                bail!("Replacement content is required for override command");
            }
            override_response(password, &session_id, &message_id, &content).await
        }
        Commands::Delete { id } => delete_session(password, &id).await,
        Commands::Analytics => show_analytics(password).await,
    }
}

async fn list_sessions(
    password: Option<String>,
    status: Option<SessionStatus>,
    limit: usize,
    offset: usize,
) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let response = get_sessions(port, &cookie, limit, offset, status).await?;

    if response.sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("{:<10} {:<10} {:<6} {:<18} NOTES", "ID", "STATUS", "MSGS", "UPDATED");
    println!("{}", "-".repeat(70));

    for session in &response.sessions {
        let notes = session.notes.as_deref().unwrap_or("-");
        let notes_short = if notes.len() > 24 { &notes[..24] } else { notes };
        println!(
            "{:<10} {:<10} {:<6} {:<18} {}",
            &session.id[..8.min(session.id.len())],
            session.status,
            session.messages.len(),
            session.updated_at.format("%Y-%m-%d %H:%M"),
            notes_short,
        );
    }
    println!("\n{} session(s)", response.count);

    Ok(())
}

async fn show_session(password: Option<String>, id: &str) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let session = get_session(port, &cookie, id).await?;

    println!("Session: {}", session.id);
    println!("Status:  {}", session.status);
    if let Some(ref notes) = session.notes {
        println!("Notes:   {notes}");
    }
    if let Some(ref user_agent) = session.user_agent {
        println!("Agent:   {user_agent}");
    }
    println!("Created: {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();

    if session.messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }

    for message in &session.messages {
        let role_display = message.role.to_string().to_uppercase();
        let mut meta = format!("[{role_display}] {}", message.id);
        if message.overridden {
            meta.push_str(" (overridden)");
        }
        println!("{meta}:");
        println!("{}", message.content);
        if let Some(ref original) = message.original_content {
            println!("  original: {original}");
        }
        println!();
    }

    Ok(())
}

async fn update_status(
    password: Option<String>,
    id: &str,
    status: SessionStatus,
    notes: Option<String>,
) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let body = serde_json::json!({
        "action": "update_status",
        "session_id": id,
        "status": status.as_str(),
        "notes": notes,
    });
    let response = post_action(port, &cookie, &body).await?;
    println!("{}", response.message);
    Ok(())
}

async fn flag_session(password: Option<String>, id: &str, reason: &str) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let body = serde_json::json!({
        "action": "flag",
        "session_id": id,
        "reason": reason,
    });
    let response = post_action(port, &cookie, &body).await?;
    println!("{}", response.message);
    Ok(())
}

async fn override_response(
    password: Option<String>,
    session_id: &str,
    message_id: &str,
    content: &str,
) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let body = serde_json::json!({
        "action": "override",
        "session_id": session_id,
        "message_id": message_id,
        "content": content,
    });
    let response = post_action(port, &cookie, &body).await?;
    println!("{}", response.message);
    Ok(())
}

async fn delete_session(password: Option<String>, id: &str) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let body = serde_json::json!({
        "action": "delete",
        "session_id": id,
    });
    let response = post_action(port, &cookie, &body).await?;
    println!("{}", response.message);
    Ok(())
}

async fn show_analytics(password: Option<String>) -> Result<()> {
    let (port, cookie) = connect(password).await?;
    let analytics = get_analytics(port, &cookie).await?;

    println!("Sessions:        {}", analytics.total_sessions);
    println!("Messages:        {}", analytics.total_messages);
    println!("Flagged:         {}", analytics.flagged_count);
    println!("Avg per session: {:.1}", analytics.avg_messages_per_session);

    if !analytics.top_questions.is_empty() {
        println!("Top questions:");
        for question in &analytics.top_questions {
            println!("  {:>3}x {}", question.count, question.question);
        }
    }

    Ok(())
}
