//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config;
use crate::models::SessionStatus;

/// Auxidien admin - moderate support-chat sessions from the terminal
#[derive(Parser, Debug)]
#[command(name = "auxadmin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Admin password (falls back to the ADMIN_PASSWORD environment variable)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the dashboard server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
        port: u16,

        /// Open the dashboard in a browser
        #[arg(long)]
        open: bool,

        /// Path to the session database (default: ~/.auxadmin/auxadmin.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List chat sessions
    List {
        /// Only show sessions with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Number of sessions to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show one session's transcript
    Show {
        /// Session ID
        id: String,
    },

    /// Set a session's status
    Status {
        /// Session ID
        id: String,

        /// New status
        #[arg(value_enum)]
        status: StatusArg,

        /// Replace the session notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Flag a session for review
    Flag {
        /// Session ID
        id: String,

        /// Reason for flagging
        #[arg(trailing_var_arg = true)]
        reason: Vec<String>,
    },

    /// Override an assistant response
    Override {
        /// Session ID
        session_id: String,

        /// Message ID within the session
        message_id: String,

        /// Replacement content
        #[arg(trailing_var_arg = true)]
        content: Vec<String>,
    },

    /// Delete a session permanently
    Delete {
        /// Session ID
        id: String,
    },

    /// Show aggregate analytics
    Analytics,
}

/// Session status values accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Active,
    Resolved,
    Flagged,
}

impl From<StatusArg> for SessionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Resolved => Self::Resolved,
            StatusArg::Flagged => Self::Flagged,
        }
    }
}
