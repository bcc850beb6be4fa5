//! Usergate CLI - run and administer the Usergate API.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "usergate")]
#[command(about = "Usergate - session authentication and user management API")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Data directory override
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Check whether the server is up
    Status,

    /// Generate a JWT signing secret
    Secret {
        /// Store the secret in the config file
        #[arg(long)]
        write: bool,
    },

    /// Admin account management
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an admin account
    Create {
        /// Login email
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long, default_value = usergate_gateway::auth::setup::DEFAULT_ADMIN_NAME)]
        name: String,

        /// Password (prompted when absent)
        #[arg(long)]
        password: Option<String>,

        /// Generate a random password
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,
    },

    /// List all accounts
    List,

    /// Re-enable an account
    Enable {
        /// Login email of the account
        #[arg(long)]
        email: String,
    },

    /// Disable an account
    Disable {
        /// Login email of the account
        #[arg(long)]
        email: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Serve {
            port,
            bind,
            data_dir,
        } => {
            let args = commands::serve::ServeArgs {
                port,
                bind,
                data_dir,
            };
            commands::run_serve(args).await?;
        }

        Commands::Status => {
            commands::run_status().await?;
        }

        Commands::Secret { write } => {
            commands::run_secret(commands::secret::SecretArgs { write })?;
        }

        Commands::Admin { action, data_dir } => {
            let args = commands::admin::AdminArgs {
                action: match action {
                    AdminCommands::Create {
                        email,
                        name,
                        password,
                        generate_password,
                    } => commands::admin::AdminAction::Create {
                        email,
                        name,
                        password,
                        generate_password,
                    },
                    AdminCommands::List => commands::admin::AdminAction::List,
                    AdminCommands::Enable { email } => {
                        commands::admin::AdminAction::Enable { email }
                    }
                    AdminCommands::Disable { email } => {
                        commands::admin::AdminAction::Disable { email }
                    }
                },
                data_dir,
            };
            commands::run_admin(args)?;
        }
    }

    Ok(())
}
