//! CLI command implementations.

pub mod admin;
pub mod secret;
pub mod serve;
pub mod status;

pub use admin::run_admin;
pub use secret::run_secret;
pub use serve::run_serve;
pub use status::run_status;

use anyhow::Context;
use usergate_core::Config;

/// Load the config file, or defaults when none exists, then apply
/// environment overrides.
pub fn load_config() -> anyhow::Result<Config> {
    let path = Config::default_path();
    let config = Config::load_default()
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(config.with_env_overrides())
}
