//! Admin account management commands.
//!
//! These open the sled database directly, so they fail while a server
//! holds it.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use usergate_core::AccountStatus;
use usergate_core::validation::normalize_email;
use usergate_gateway::auth::setup::{AdminSeed, create_admin, generate_password};
use usergate_gateway::{AccountStore, Visibility};

use super::load_config;
use crate::ui;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Admin actions.
pub enum AdminAction {
    /// Create an admin account.
    Create {
        email: String,
        name: String,
        password: Option<String>,
        generate_password: bool,
    },
    /// List all accounts.
    List,
    /// Enable an account.
    Enable { email: String },
    /// Disable an account.
    Disable { email: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_admin(args: AdminArgs) -> anyhow::Result<()> {
    let mut config = load_config()?;
    if args.data_dir.is_some() {
        config.server.data_dir = args.data_dir;
    }

    let store = open_store(&config.data_dir())?;

    match args.action {
        AdminAction::Create {
            email,
            name,
            password,
            generate_password: gen_pwd,
        } => {
            let password = resolve_password(password, gen_pwd)?;
            create(&store, &name, &email, password, &config.uploads.default_image)?;
        }
        AdminAction::List => list_accounts(&store)?,
        AdminAction::Enable { email } => set_status(&store, &email, AccountStatus::Active)?,
        AdminAction::Disable { email } => set_status(&store, &email, AccountStatus::Disabled)?,
    }

    store.db().flush().context("Failed to flush database")?;
    Ok(())
}

fn open_store(data_dir: &Path) -> anyhow::Result<AccountStore> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join("db");
    let db = sled::open(&path).with_context(|| {
        format!(
            "Failed to open {} (is the server running?)",
            path.display()
        )
    })?;
    AccountStore::with_db(db).context("Failed to open account store")
}

fn resolve_password(password: Option<String>, gen_pwd: bool) -> anyhow::Result<String> {
    if gen_pwd {
        let pwd = generate_password(16);
        ui::success(&format!("Generated password: {pwd}"));
        return Ok(pwd);
    }
    match password {
        Some(pwd) => Ok(pwd),
        None => ui::prompts::new_password("Password").context("Password prompt failed"),
    }
}

fn create(
    store: &AccountStore,
    name: &str,
    email: &str,
    password: String,
    image: &str,
) -> anyhow::Result<()> {
    let seed = AdminSeed {
        name: name.to_string(),
        email: email.to_string(),
        password,
    };
    let admin = create_admin(store, &seed, image)?;
    ui::success(&format!("Created admin '{}' ({})", admin.email, admin.id));
    Ok(())
}

fn list_accounts(store: &AccountStore) -> anyhow::Result<()> {
    let mut accounts = store.list()?;

    if accounts.is_empty() {
        ui::info("No accounts yet.");
        ui::info("Run 'usergate admin create --email <email> --generate-password' to create one.");
        return Ok(());
    }
    accounts.sort_by(|a, b| a.email.cmp(&b.email));

    ui::info(&format!("Accounts ({}):", accounts.len()));
    println!();
    println!(
        "{:<32} {:<24} {:<6} {:<9} {:<20}",
        "EMAIL", "NAME", "ROLE", "STATUS", "CREATED"
    );
    println!("{}", "-".repeat(94));

    for account in accounts {
        let created = account.created_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "{:<32} {:<24} {:<6} {:<9} {:<20}",
            account.email, account.name, account.role, account.status, created
        );
    }

    Ok(())
}

fn set_status(store: &AccountStore, email: &str, status: AccountStatus) -> anyhow::Result<()> {
    let email = normalize_email(email);
    let Some(account) = store.find_by_email(&email, Visibility::IncludeDisabled)? else {
        bail!("No account with email {email}");
    };
    if account.status == status {
        ui::info(&format!("'{email}' is already {status}"));
        return Ok(());
    }

    store.set_status(&account.id, status)?;
    ui::success(&format!("'{email}' is now {status}"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_admin_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path()).unwrap();

        create(
            &store,
            "Root",
            "Root@Example.com",
            "Secure#Pass123".to_string(),
            "default-user-icon.jpg",
        )
        .unwrap();

        set_status(&store, "root@example.com", AccountStatus::Disabled).unwrap();
        let account = store
            .find_by_email("root@example.com", Visibility::IncludeDisabled)
            .unwrap()
            .unwrap();
        assert_eq!(account.status, AccountStatus::Disabled);

        set_status(&store, "root@example.com", AccountStatus::Active).unwrap();
        assert!(
            store
                .find_by_email("root@example.com", Visibility::ActiveOnly)
                .unwrap()
                .is_some()
        );

        assert!(set_status(&store, "nobody@example.com", AccountStatus::Active).is_err());
    }

    #[test]
    fn test_generated_password_used() {
        let password = resolve_password(None, true).unwrap();
        assert_eq!(password.len(), 16);
        assert_eq!(
            resolve_password(Some("given".to_string()), false).unwrap(),
            "given"
        );
    }
}
