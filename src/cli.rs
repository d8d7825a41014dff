//! Command-line interface for vestra.

use clap::{Parser, Subcommand};

/// Vestra - account and session service for the stylist app
#[derive(Parser)]
#[command(name = "vestra")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API server with the background sweeper
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Create an administrator account
    CreateAdmin {
        username: String,
        email: String,
        password: String,
    },

    /// Generate a password-reset token for an account and print it.
    /// Handing the token to the user is up to you; there is no mailer.
    ResetPassword {
        /// Username or email
        identifier: String,
    },

    /// Run the session/audit sweep once and exit
    Sweep,
}
