//! Secret command - generate a JWT signing secret.

use anyhow::Result;
use usergate_core::Config;
use usergate_gateway::JwtManager;

use crate::ui;

/// Secret command arguments.
#[derive(Debug, Clone, Default)]
pub struct SecretArgs {
    /// Store the secret in the config file instead of printing it.
    pub write: bool,
}

/// Run the secret command.
pub fn run_secret(args: SecretArgs) -> Result<()> {
    let secret = JwtManager::generate_hex_secret();

    if !args.write {
        println!("{secret}");
        return Ok(());
    }

    let path = Config::default_path();
    // Environment overrides must not leak into the file.
    let mut config = Config::load_default()?;
    config.session.jwt_secret = Some(secret);
    config.save(&path)?;

    ui::success(&format!("JWT secret written to {}", path.display()));
    ui::warning("Existing sessions are invalidated once the server restarts");
    Ok(())
}
