//! Auxidien admin server - HTTP facade over the session store.
//!
//! Architecture:
//! - One server per machine runs at ~/.auxadmin (manages PID/port files)
//! - The session store is a local SQLite database owned by the server
//! - The CLI is a thin client that talks to the server via HTTP
//!
//! Endpoints:
//! - GET  /                     - Dashboard (redirects to /login when unauthenticated)
//! - GET  /login                - Login page
//! - POST /api/auth             - Login (sets the admin cookie)
//! - DELETE /api/auth           - Logout (clears the admin cookie)
//! - GET  /api/auth             - Auth status
//! - GET  /api/sessions         - List sessions (limit/offset/status)
//! - GET  /api/sessions/{id}    - Get one session
//! - GET  /api/analytics        - Derived analytics snapshot
//! - POST /api/sessions/action  - Moderation actions (override/update_status/flag/delete)
//! - POST /api/chat/messages    - Chat intake (used by the public chat surface)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth;
use crate::config::{self, Config};
use crate::db::{AnalyticsQueries, Database, MessageQueries, SessionQueries};
use crate::error::AdminError;
use crate::models::{ChatSession, MessageRole, SessionStatus};

/// Server configuration file names (under `~/.auxadmin`).
const PID_FILE: &str = "server.pid";
const PORT_FILE: &str = "server.port";

/// Maximum request body size (64KB).
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared server state.
pub struct ServerState {
    /// SQLite session store.
    pub db: Database,
    /// Credentials shared by the auth gate and the auth handlers.
    pub auth: crate::config::AuthConfig,
}

// === Request/Response Types ===

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// Query parameters for listing sessions.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub status: Option<String>,
}

const fn default_limit() -> usize {
    50
}

/// Moderation action request.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub session_id: Option<String>,
    pub message_id: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Chat intake request (sent by the public chat surface, not by admins).
#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    /// Existing session to append to; omitted on the first message.
    pub session_id: Option<String>,
    pub role: String,
    pub content: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

// === Server Lifecycle ===

/// Start the server.
pub async fn start_server(config: Config, open_browser: bool) -> Result<()> {
    let server_dir = config::data_dir()?;

    let pid = std::process::id();
    std::fs::write(server_dir.join(PID_FILE), pid.to_string())?;
    std::fs::write(server_dir.join(PORT_FILE), config.port.to_string())?;

    let db = Database::open_at(&config.db_path)?;
    let state = Arc::new(ServerState {
        db,
        auth: config.auth.clone(),
    });

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    println!("auxadmin server starting on http://{addr}");
    println!("Dashboard: http://{addr}/  (login with the admin password)");
    tracing::info!(%addr, db = %config.db_path.display(), "admin server listening");

    if open_browser {
        let _ = open::that(format!("http://{addr}"));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await.context("Server error")?;

    let _ = std::fs::remove_file(server_dir.join(PID_FILE));
    let _ = std::fs::remove_file(server_dir.join(PORT_FILE));

    Ok(())
}

/// Build the router with all routes and layers.
fn router(state: Arc<ServerState>) -> Router {
    let admin_api = Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/action", post(session_action))
        .route("/api/analytics", get(get_analytics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(login_page))
        .route(
            "/api/auth",
            post(handle_login).delete(handle_logout).get(handle_auth_status),
        )
        .route("/api/chat/messages", post(chat_intake))
        .merge(admin_api)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Read the port of a running server, if any (validates the PID on unix).
pub fn get_server_port() -> Option<u16> {
    let server_dir = config::data_dir().ok()?;
    let pid_file = server_dir.join(PID_FILE);
    let port_file = server_dir.join(PORT_FILE);

    if let Ok(pid_str) = std::fs::read_to_string(&pid_file) {
        if let Ok(pid) = pid_str.trim().parse::<u32>() {
            #[cfg(unix)]
            {
                use std::process::Command;
                let output = Command::new("kill").args(["-0", &pid.to_string()]).output();
                if output.map(|o| o.status.success()).unwrap_or(false) {
                    if let Ok(port_str) = std::fs::read_to_string(&port_file) {
                        return port_str.trim().parse().ok();
                    }
                }
            }
            #[cfg(not(unix))]
            {
                if let Ok(port_str) = std::fs::read_to_string(&port_file) {
                    return port_str.trim().parse().ok();
                }
            }
        }
    }
    None
}

/// Spawn the server as a detached background process.
pub fn spawn_server_daemon(port: u16) -> Result<()> {
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe()?;

    #[cfg(unix)]
    {
        Command::new(&exe)
            .args(["serve", "--port", &port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn server daemon")?;
    }

    #[cfg(not(unix))]
    {
        Command::new(&exe)
            .args(["serve", "--port", &port.to_string()])
            .spawn()
            .context("Failed to spawn server daemon")?;
    }

    std::thread::sleep(std::time::Duration::from_millis(500));
    Ok(())
}

/// Return the port of a running server, starting one if necessary.
pub fn ensure_server_running() -> Result<u16> {
    if let Some(port) = get_server_port() {
        return Ok(port);
    }

    let port = config::DEFAULT_PORT;
    spawn_server_daemon(port)?;

    for _ in 0..20 {
        if let Some(p) = get_server_port() {
            return Ok(p);
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    anyhow::bail!("Server failed to start")
}

// === Page Handlers ===

async fn index_handler(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if auth::is_authenticated(&headers, &state.auth) {
        Html(include_str!("ui.html")).into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

async fn login_page() -> Html<&'static str> {
    Html(include_str!("login.html"))
}

// === Auth Handlers ===

async fn handle_login(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AdminError> {
    if body.password.is_empty() {
        return Err(AdminError::InvalidRequest("password required".to_string()));
    }
    if body.password != state.auth.admin_password {
        tracing::warn!("failed admin login attempt");
        return Err(AdminError::Unauthorized);
    }

    Ok((
        [(header::SET_COOKIE, auth::login_cookie(&state.auth))],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}

async fn handle_logout(State(state): State<Arc<ServerState>>) -> Response {
    (
        [(header::SET_COOKIE, auth::logout_cookie(&state.auth))],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}

async fn handle_auth_status(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let authenticated = auth::is_authenticated(&headers, &state.auth);
    Json(serde_json::json!({ "authenticated": authenticated }))
}

// === Admin API Handlers ===

async fn list_sessions(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            SessionStatus::from_str(s)
                .ok_or_else(|| AdminError::InvalidRequest(format!("unknown status: {s}")))
        })
        .transpose()?;

    let conn = state.db.lock()?;
    let sessions = SessionQueries::list(&conn, query.limit, query.offset, status)?;

    Ok(Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, AdminError> {
    let conn = state.db.lock()?;
    let session = SessionQueries::get(&conn, &id)?;
    Ok(Json(session))
}

async fn get_analytics(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<crate::models::Analytics>, AdminError> {
    let conn = state.db.lock()?;
    let analytics = AnalyticsQueries::compute(&conn)?;
    Ok(Json(analytics))
}

async fn session_action(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let session_id = body
        .session_id
        .as_deref()
        .ok_or_else(|| AdminError::InvalidRequest("session_id required".to_string()))?;

    let conn = state.db.lock()?;

    let message = match body.action.as_str() {
        "override" => {
            let message_id = body
                .message_id
                .as_deref()
                .ok_or_else(|| AdminError::InvalidRequest("message_id required".to_string()))?;
            let content = body
                .content
                .as_deref()
                .ok_or_else(|| AdminError::InvalidRequest("content required".to_string()))?;
            MessageQueries::override_content(&conn, session_id, message_id, content)?;
            "Response overridden"
        }
        "update_status" => {
            let status_str = body
                .status
                .as_deref()
                .ok_or_else(|| AdminError::InvalidRequest("status required".to_string()))?;
            let status = SessionStatus::from_str(status_str).ok_or_else(|| {
                AdminError::InvalidRequest(format!("unknown status: {status_str}"))
            })?;
            SessionQueries::update_status(&conn, session_id, status, body.notes.as_deref())?;
            "Status updated"
        }
        "flag" => {
            let reason = body
                .reason
                .as_deref()
                .ok_or_else(|| AdminError::InvalidRequest("reason required".to_string()))?;
            SessionQueries::flag(&conn, session_id, reason)?;
            "Session flagged"
        }
        "delete" => {
            let removed = SessionQueries::delete(&conn, session_id)?;
            if !removed {
                tracing::debug!(session_id, "delete of unknown session (no-op)");
            }
            "Session deleted"
        }
        other => {
            return Err(AdminError::InvalidRequest(format!(
                "invalid action: {other}"
            )));
        }
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "message": message,
    })))
}

// === Intake Handler ===

async fn chat_intake(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<IntakeRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let role = MessageRole::from_str(&body.role)
        .ok_or_else(|| AdminError::InvalidRequest(format!("unknown role: {}", body.role)))?;

    let conn = state.db.lock()?;

    let session_id = match body.session_id {
        Some(id) => id,
        None => {
            let session = ChatSession::new(
                uuid::Uuid::now_v7().to_string(),
                body.user_agent.clone(),
                body.ip.clone(),
            );
            SessionQueries::insert(&conn, &session)?;
            tracing::info!(session_id = %session.id, "new chat session");
            session.id
        }
    };

    let message = MessageQueries::append(&conn, &session_id, role, &body.content)?;

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "message_id": message.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, AUTH_COOKIE_NAME, AUTH_TOKEN};
    use axum::http::header::{COOKIE, SET_COOKIE};
    use tempfile::NamedTempFile;

    fn make_test_state() -> (NamedTempFile, Arc<ServerState>) {
        let db_file = NamedTempFile::new().unwrap();
        let db = Database::open_at(db_file.path()).unwrap();
        let state = Arc::new(ServerState {
            db,
            auth: AuthConfig::with_password("test-password".to_string()),
        });
        (db_file, state)
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("{AUTH_COOKIE_NAME}={AUTH_TOKEN}").parse().unwrap(),
        );
        headers
    }

    async fn intake(
        state: &Arc<ServerState>,
        session_id: Option<String>,
        role: &str,
        content: &str,
    ) -> serde_json::Value {
        let Json(value) = chat_intake(
            State(state.clone()),
            Json(IntakeRequest {
                session_id,
                role: role.to_string(),
                content: content.to_string(),
                user_agent: None,
                ip: None,
            }),
        )
        .await
        .unwrap();
        value
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_401_without_cookie() {
        let (_f, state) = make_test_state();
        let result = handle_login(
            State(state),
            Json(LoginRequest {
                password: "wrong".to_string(),
            }),
        )
        .await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn login_with_empty_password_is_400() {
        let (_f, state) = make_test_state();
        let result = handle_login(
            State(state),
            Json(LoginRequest {
                password: String::new(),
            }),
        )
        .await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_with_correct_password_sets_cookie() {
        let (_f, state) = make_test_state();
        let response = handle_login(
            State(state),
            Json(LoginRequest {
                password: "test-password".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("{AUTH_COOKIE_NAME}={AUTH_TOKEN}")));
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let (_f, state) = make_test_state();
        let response = handle_logout(State(state)).await;
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn auth_status_reflects_cookie() {
        let (_f, state) = make_test_state();

        let Json(unauth) = handle_auth_status(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(unauth["authenticated"], false);

        let Json(authed) = handle_auth_status(State(state), auth_headers()).await;
        assert_eq!(authed["authenticated"], true);
    }

    #[tokio::test]
    async fn index_redirects_to_login_when_unauthenticated() {
        let (_f, state) = make_test_state();
        let response = index_handler(State(state), HeaderMap::new()).await;
        assert!(response.status().is_redirection());
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn index_serves_dashboard_when_authenticated() {
        let (_f, state) = make_test_state();
        let response = index_handler(State(state), auth_headers()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn intake_creates_session_then_appends() {
        let (_f, state) = make_test_state();

        let first = intake(&state, None, "user", "hello").await;
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let second = intake(&state, Some(session_id.clone()), "assistant", "hi!").await;
        assert_eq!(second["session_id"], session_id.as_str());

        let Json(session) = get_session(State(state), Path(session_id)).await.unwrap();
        assert_eq!(session.messages.len(), 2);
    }

    #[tokio::test]
    async fn intake_with_unknown_role_is_400() {
        let (_f, state) = make_test_state();
        let err = chat_intake(
            State(state),
            Json(IntakeRequest {
                session_id: None,
                role: "system".to_string(),
                content: "x".to_string(),
                user_agent: None,
                ip: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_sessions_filters_and_counts() {
        let (_f, state) = make_test_state();
        let a = intake(&state, None, "user", "first question").await;
        let _b = intake(&state, None, "user", "second question").await;

        let flagged_id = a["session_id"].as_str().unwrap();
        {
            let conn = state.db.lock().unwrap();
            SessionQueries::flag(&conn, flagged_id, "needs review").unwrap();
        }

        let Json(all) = list_sessions(
            State(state.clone()),
            Query(ListQuery {
                limit: 50,
                offset: 0,
                status: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(all["count"], 2);

        let Json(flagged) = list_sessions(
            State(state),
            Query(ListQuery {
                limit: 50,
                offset: 0,
                status: Some("flagged".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(flagged["count"], 1);
        assert_eq!(flagged["sessions"][0]["id"], flagged_id);
    }

    #[tokio::test]
    async fn list_sessions_with_unknown_status_is_400() {
        let (_f, state) = make_test_state();
        let err = list_sessions(
            State(state),
            Query(ListQuery {
                limit: 50,
                offset: 0,
                status: Some("archived".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_session_is_404() {
        let (_f, state) = make_test_state();
        let err = get_session(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    fn action(session_id: Option<&str>, action: &str) -> ActionRequest {
        ActionRequest {
            action: action.to_string(),
            session_id: session_id.map(String::from),
            message_id: None,
            content: None,
            status: None,
            reason: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn action_without_session_id_is_400() {
        let (_f, state) = make_test_state();
        let err = session_action(State(state), Json(action(None, "delete")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_action_is_400() {
        let (_f, state) = make_test_state();
        let err = session_action(State(state), Json(action(Some("s"), "promote")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn flag_action_requires_reason() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "hello").await;
        let id = created["session_id"].as_str().unwrap();

        let err = session_action(State(state), Json(action(Some(id), "flag")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_status_action_rejects_unknown_status() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "hello").await;
        let id = created["session_id"].as_str().unwrap();

        let mut request = action(Some(id), "update_status");
        request.status = Some("archived".to_string());
        let err = session_action(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_status_action_round_trips() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "hello").await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let mut request = action(Some(&id), "update_status");
        request.status = Some("resolved".to_string());
        request.notes = Some("done".to_string());
        let Json(response) = session_action(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(response["success"], true);

        let Json(session) = get_session(State(state), Path(id)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Resolved);
        assert_eq!(session.notes.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn override_action_preserves_original() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "question").await;
        let id = created["session_id"].as_str().unwrap().to_string();
        let reply = intake(&state, Some(id.clone()), "assistant", "bad answer").await;
        let message_id = reply["message_id"].as_str().unwrap().to_string();

        let mut request = action(Some(&id), "override");
        request.message_id = Some(message_id);
        request.content = Some("good answer".to_string());
        session_action(State(state.clone()), Json(request))
            .await
            .unwrap();

        let Json(session) = get_session(State(state), Path(id)).await.unwrap();
        let overridden = &session.messages[1];
        assert!(overridden.overridden);
        assert_eq!(overridden.content, "good answer");
        assert_eq!(overridden.original_content.as_deref(), Some("bad answer"));
    }

    #[tokio::test]
    async fn delete_action_is_idempotent() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "hello").await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let Json(first) = session_action(State(state.clone()), Json(action(Some(&id), "delete")))
            .await
            .unwrap();
        assert_eq!(first["success"], true);

        // Deleting again is still a success per observed behavior.
        let Json(second) = session_action(State(state.clone()), Json(action(Some(&id), "delete")))
            .await
            .unwrap();
        assert_eq!(second["success"], true);

        let err = get_session(State(state), Path(id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analytics_handler_reports_counts() {
        let (_f, state) = make_test_state();
        let created = intake(&state, None, "user", "what is auxidien?").await;
        let id = created["session_id"].as_str().unwrap().to_string();
        intake(&state, Some(id), "assistant", "a token project").await;

        let Json(analytics) = get_analytics(State(state)).await.unwrap();
        assert_eq!(analytics.total_sessions, 1);
        assert_eq!(analytics.total_messages, 2);
        assert_eq!(analytics.top_questions[0].question, "what is auxidien?");
    }
}
