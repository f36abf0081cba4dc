//! Auxadmin - moderation dashboard for Auxidien support chats.
//!
//! Admins review chat sessions between end users and the assistant: flag or
//! resolve conversations, override assistant responses (keeping the original
//! for audit), delete sessions, and read aggregate analytics.
//!
//! Architecture:
//! - A single server owns the SQLite session store and serves the dashboard
//!   plus a JSON admin API, gated by a shared-password cookie
//! - The CLI is a thin client that talks to the server via HTTP
//! - The public chat surface feeds sessions in through an intake endpoint

mod auth;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("auxadmin=info")),
        )
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
