//! Orchard CLI - operator tooling against the hosted backend.
//!
//! # Usage
//!
//! ```bash
//! # Give a user access to the admin catalog panel
//! orchard admin grant --user-id 0b6f3c5e-7c1a-4d8e-9a51-2f4a8a1d3e01
//!
//! # Take it away again
//! orchard admin revoke --user-id 0b6f3c5e-7c1a-4d8e-9a51-2f4a8a1d3e01
//!
//! # Load the catalog from a YAML file
//! orchard seed products --file seed/products.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Backend base URL
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service-role key (bypasses row-level security)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use orchard_core::UserId;

mod commands;

#[derive(Parser)]
#[command(name = "orchard")]
#[command(author, version, about = "Orchard operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the admin flag on user profiles
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Load data into the backend
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Mark a user as an admin
    Grant {
        /// Auth user ID (UUID)
        #[arg(short, long)]
        user_id: UserId,
    },
    /// Remove a user's admin flag
    Revoke {
        /// Auth user ID (UUID)
        #[arg(short, long)]
        user_id: UserId,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert products from a YAML file
    Products {
        /// Path to the YAML file
        #[arg(short, long)]
        file: String,

        /// Validate the file without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip entries whose name already exists in the catalog
        #[arg(long)]
        skip_existing: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Admin { action } => match action {
            AdminAction::Grant { user_id } => commands::admin::set_admin(user_id, true).await?,
            AdminAction::Revoke { user_id } => commands::admin::set_admin(user_id, false).await?,
        },
        Commands::Seed { target } => match target {
            SeedTarget::Products {
                file,
                dry_run,
                skip_existing,
            } => {
                let options = commands::seed::SeedOptions {
                    dry_run,
                    skip_existing,
                };
                commands::seed::products(&file, options).await?;
            }
        },
    }
    Ok(())
}
