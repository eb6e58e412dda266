//! Campaign CLI - back-office account provisioning.
//!
//! # Usage
//!
//! ```bash
//! # Create an administrator (a random password is generated and shown once)
//! cm-cli admin create -e admin@example.com -n "Admin Name"
//!
//! # Create an editor with a chosen password
//! cm-cli admin create -e editor@example.com -n "Editor" -r editor --password 'S3cret!pass'
//!
//! # Show the profile row for an email
//! cm-cli admin show -e admin@example.com
//! ```
//!
//! # Commands
//!
//! - `admin create` - Create an auth identity and its profile row
//! - `admin show` - Look up a profile by email

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cm-cli")]
#[command(author, version, about = "Campaign back-office CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage back-office accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new account with a profile
    Create {
        /// Login email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`admin`, `editor`, `moderator`)
        #[arg(short, long, default_value = "admin")]
        role: String,

        /// Password (generated when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Show the profile for an email
    Show {
        /// Email address to look up
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                role,
                password,
            } => {
                commands::admin::create_user(&email, &name, &role, password).await?;
            }
            AdminAction::Show { email } => {
                commands::admin::show_user(&email).await?;
            }
        },
    }
    Ok(())
}
