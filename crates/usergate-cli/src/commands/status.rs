//! Status command - check the server and configuration.

use std::time::Duration;

use anyhow::Result;
use usergate_core::Config;

use super::load_config;
use crate::ui::{self, HealthStatus};

/// Run the status command.
pub async fn run_status() -> Result<()> {
    ui::header("Usergate Status");

    println!();
    ui::info("Configuration");
    let path = Config::default_path();
    let config = match load_config() {
        Ok(config) => {
            let detail = if path.exists() { "loaded" } else { "defaults" };
            ui::health_check("Config", HealthStatus::Ok, Some(detail));
            config
        }
        Err(e) => {
            ui::health_check("Config", HealthStatus::Error, Some(&format!("{e:#}")));
            return Ok(());
        }
    };
    ui::kv("  Path", &path.display().to_string());
    ui::kv("  Data", &config.data_dir().display().to_string());
    let secret = if config.session.jwt_secret.is_some() {
        HealthStatus::Ok
    } else {
        HealthStatus::Warning
    };
    ui::health_check(
        "JWT secret",
        secret,
        Some(match secret {
            HealthStatus::Ok => "configured",
            _ => "ephemeral",
        }),
    );

    println!();
    ui::info("Server");
    let url = format!(
        "http://{}:{}/health",
        config.server.bind, config.server.port
    );
    match check_health(&url).await {
        ServerStatus::Running => {
            ui::health_check("Status", HealthStatus::Ok, Some("running"));
        }
        ServerStatus::Unhealthy(code) => {
            ui::health_check("Status", HealthStatus::Error, Some(&format!("HTTP {code}")));
        }
        ServerStatus::NotRunning => {
            ui::health_check("Status", HealthStatus::Warning, Some("not running"));
            ui::info("  Start with: usergate serve");
        }
    }
    ui::kv("  URL", &url);

    Ok(())
}

enum ServerStatus {
    Running,
    Unhealthy(u16),
    NotRunning,
}

async fn check_health(url: &str) -> ServerStatus {
    let client = reqwest::Client::new();
    match client
        .get(url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => ServerStatus::Running,
        Ok(resp) => ServerStatus::Unhealthy(resp.status().as_u16()),
        Err(e) => {
            tracing::debug!(error = %e, "Health check failed");
            ServerStatus::NotRunning
        }
    }
}
