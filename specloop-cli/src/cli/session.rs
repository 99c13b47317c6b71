//! Session management commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List sessions, most recently active first
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a session and its conversation history
    Show {
        /// Session ID (default: the active session)
        session_id: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Make a session the active one
    Activate {
        /// Session ID
        session_id: String,
    },

    /// Delete a session
    Delete {
        /// Session ID
        session_id: String,
    },

    /// Evict idle and surplus sessions
    Cleanup,

    /// Delete every session
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
