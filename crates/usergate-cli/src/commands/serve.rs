//! Serve command - start the API server.

use std::path::PathBuf;

use anyhow::Result;

use super::load_config;
use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port to listen on.
    pub port: Option<u16>,
    /// Bind address.
    pub bind: Option<String>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Run the serve command.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if args.data_dir.is_some() {
        config.server.data_dir = args.data_dir;
    }

    let address = format!("{}:{}", config.server.bind, config.server.port);

    // Check if port is already in use
    if std::net::TcpListener::bind(&address).is_err() {
        ui::error(&format!("{address} is already in use"));
        return Ok(());
    }

    ui::header("Starting Usergate");
    ui::kv("Address", &address);
    ui::kv("Data", &config.data_dir().display().to_string());
    ui::kv("Uploads", &config.upload_dir().display().to_string());
    if config.session.jwt_secret.is_none() {
        ui::warning("No JWT secret configured; run 'usergate secret --write' to persist one");
    }
    println!();
    ui::info("Press Ctrl+C to stop");
    println!();

    usergate_gateway::start(config).await?;

    Ok(())
}
