//! Runtime configuration.
//!
//! The auth gate and the API handlers must agree exactly on the cookie name
//! and session token, so both live here as single constants and travel in
//! one `AuthConfig` value instead of being re-declared at each use site.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Name of the admin session cookie.
pub const AUTH_COOKIE_NAME: &str = "auxidien_admin_auth";

/// Fixed value an authenticated session cookie must carry (case-sensitive).
pub const AUTH_TOKEN: &str = "authenticated_admin_session";

/// Admin session lifetime in seconds (24 hours).
pub const AUTH_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24;

/// Default server port.
pub const DEFAULT_PORT: u16 = 58117;

const DEFAULT_ADMIN_PASSWORD: &str = "auxidien2026";
const DATA_DIR: &str = ".auxadmin";

/// Shared credential configuration injected into both the auth gate and the
/// admin API.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Cookie the gate inspects on every request.
    pub cookie_name: &'static str,
    /// Token value that marks a cookie as authenticated.
    pub session_token: &'static str,
    /// Shared admin password checked at login.
    pub admin_password: String,
}

impl AuthConfig {
    /// Build from the environment: `ADMIN_PASSWORD` overrides the default.
    pub fn from_env() -> Self {
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string());
        Self::with_password(admin_password)
    }

    /// Build with an explicit password (tests, CLI flags).
    pub fn with_password(admin_password: String) -> Self {
        Self {
            cookie_name: AUTH_COOKIE_NAME,
            session_token: AUTH_TOKEN,
            admin_password,
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub auth: AuthConfig,
}

impl Config {
    /// Resolve configuration from defaults and the environment.
    pub fn load(port: u16, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };
        Ok(Self {
            port,
            db_path,
            auth: AuthConfig::from_env(),
        })
    }
}

/// Per-user data directory (`~/.auxadmin`), created on first use.
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let dir = home.join(DATA_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

fn default_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("auxadmin.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_password_carries_shared_constants() {
        let auth = AuthConfig::with_password("secret".into());
        assert_eq!(auth.cookie_name, AUTH_COOKIE_NAME);
        assert_eq!(auth.session_token, AUTH_TOKEN);
        assert_eq!(auth.admin_password, "secret");
    }
}
