//! CallReady CLI - Database migrations and account management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! cr-cli migrate
//!
//! # Create a user directly in the identity store
//! cr-cli user create -e rep@acme.io -n "Sales Rep" -p 'a long password'
//!
//! # Override a user's plan
//! cr-cli subscription set-plan -e rep@acme.io -p pro
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create a user with the default subscription
//! - `subscription set-plan` - Administrative plan override

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cr-cli")]
#[command(author, version, about = "CallReady CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage subscriptions
    Subscription {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user in the identity store
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Initial password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SubscriptionAction {
    /// Move a user to another plan
    SetPlan {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Plan (`free`, `starter`, `pro`, `enterprise`)
        #[arg(short, long)]
        plan: String,
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                password,
            } => {
                commands::accounts::create_user(&email, &name, &password).await?;
            }
        },
        Commands::Subscription { action } => match action {
            SubscriptionAction::SetPlan { email, plan } => {
                commands::accounts::set_plan(&email, &plan).await?;
            }
        },
    }
    Ok(())
}
