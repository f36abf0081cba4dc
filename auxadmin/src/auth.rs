//! Request-level auth gate.
//!
//! There is no server-side session storage: a request is authenticated iff
//! it carries the admin cookie with the exact session token (case-sensitive
//! match). Login sets the cookie, logout clears it. A single shared
//! credential covers all admins.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::config::{AuthConfig, AUTH_COOKIE_MAX_AGE_SECS};
use crate::error::AdminError;
use crate::server::ServerState;

/// Whether the request carries a valid admin session cookie.
pub fn is_authenticated(headers: &HeaderMap, auth: &AuthConfig) -> bool {
    cookie_value(headers, auth.cookie_name)
        .is_some_and(|value| value == auth.session_token)
}

/// Extract a cookie value by name from the request headers.
///
/// All `Cookie` headers are scanned; the first pair with a matching name
/// wins.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value that marks the browser session as authenticated.
///
/// Scoped http-only and same-site strict, expiring after 24 hours.
pub fn login_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        auth.cookie_name, auth.session_token, AUTH_COOKIE_MAX_AGE_SECS
    )
}

/// `Set-Cookie` value that deletes the admin session cookie.
pub fn logout_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        auth.cookie_name
    )
}

/// Middleware guarding the admin API: unauthenticated requests get 401.
pub async fn require_auth(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, AdminError> {
    if is_authenticated(request.headers(), &state.auth) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!("rejecting unauthenticated admin request");
        Err(AdminError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AUTH_COOKIE_NAME, AUTH_TOKEN};
    use axum::http::header::COOKIE;

    fn auth() -> AuthConfig {
        AuthConfig::with_password("test-password".to_string())
    }

    fn headers_with_cookie(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, raw.parse().unwrap());
        headers
    }

    #[test]
    fn exact_token_authenticates() {
        let headers = headers_with_cookie(&format!("{AUTH_COOKIE_NAME}={AUTH_TOKEN}"));
        assert!(is_authenticated(&headers, &auth()));
    }

    #[test]
    fn missing_cookie_is_unauthenticated() {
        assert!(!is_authenticated(&HeaderMap::new(), &auth()));
    }

    #[test]
    fn wrong_token_is_unauthenticated() {
        let headers = headers_with_cookie(&format!("{AUTH_COOKIE_NAME}=guessed_value"));
        assert!(!is_authenticated(&headers, &auth()));
    }

    #[test]
    fn token_match_is_case_sensitive() {
        let upper = AUTH_TOKEN.to_uppercase();
        let headers = headers_with_cookie(&format!("{AUTH_COOKIE_NAME}={upper}"));
        assert!(!is_authenticated(&headers, &auth()));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let headers = headers_with_cookie(&format!(
            "theme=dark; {AUTH_COOKIE_NAME}={AUTH_TOKEN}; lang=en"
        ));
        assert!(is_authenticated(&headers, &auth()));
    }

    #[test]
    fn other_cookie_with_token_value_does_not_authenticate() {
        let headers = headers_with_cookie(&format!("unrelated={AUTH_TOKEN}"));
        assert!(!is_authenticated(&headers, &auth()));
    }

    #[test]
    fn login_cookie_carries_scope_attributes() {
        let value = login_cookie(&auth());
        assert!(value.starts_with(&format!("{AUTH_COOKIE_NAME}={AUTH_TOKEN}")));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Max-Age=86400"));
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let value = logout_cookie(&auth());
        assert!(value.contains("Max-Age=0"));
    }
}
