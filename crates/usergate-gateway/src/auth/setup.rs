//! Bootstrap of the first admin account.
//!
//! On an empty store, `USERGATE_ADMIN_EMAIL` and `USERGATE_ADMIN_PASSWORD`
//! (plus optional `USERGATE_ADMIN_NAME`) create an active admin at startup.

use rand::Rng;
use usergate_core::Role;
use usergate_core::validation::{
    WEAK_PASSWORD_MESSAGE, is_email, is_strong_password, normalize_email, normalize_name,
};

use super::AuthError;
use super::password::hash_password;
use crate::store::{Account, AccountStore};

/// Name used when `USERGATE_ADMIN_NAME` is unset.
pub const DEFAULT_ADMIN_NAME: &str = "Administrator";

/// Credentials for a new admin account.
#[derive(Clone)]
pub struct AdminSeed {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Plain password.
    pub password: String,
}

impl AdminSeed {
    /// Read the seed from the environment, if both email and password are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("USERGATE_ADMIN_EMAIL")
            .ok()
            .filter(|v| !v.is_empty())?;
        let password = std::env::var("USERGATE_ADMIN_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty())?;
        let name = std::env::var("USERGATE_ADMIN_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string());

        Some(Self {
            name,
            email,
            password,
        })
    }
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Create an active admin account from `seed`.
///
/// # Errors
///
/// Returns `AuthError::Config` for an invalid email or weak password, or
/// the store error if creation fails.
pub fn create_admin(
    store: &AccountStore,
    seed: &AdminSeed,
    image: &str,
) -> Result<Account, AuthError> {
    let email = normalize_email(&seed.email);
    if !is_email(&email) {
        return Err(AuthError::Config(format!("Invalid admin email: {email}")));
    }
    if !is_strong_password(&seed.password) {
        return Err(AuthError::Config(format!(
            "Admin {WEAK_PASSWORD_MESSAGE}"
        )));
    }

    let admin = Account::new(
        normalize_name(&seed.name),
        email,
        hash_password(&seed.password)?,
        Role::Admin,
        image,
    );
    store.create(&admin)?;
    Ok(admin)
}

/// Create the admin from the environment when the store is empty.
///
/// # Errors
///
/// Returns error if the seed is invalid or creation fails.
pub fn auto_setup_from_env(
    store: &AccountStore,
    image: &str,
) -> Result<Option<Account>, AuthError> {
    // Only auto-setup if no accounts exist
    if !store.is_empty() {
        return Ok(None);
    }

    let Some(seed) = AdminSeed::from_env() else {
        return Ok(None);
    };

    let admin = create_admin(store, &seed, image)?;
    tracing::info!(
        account_id = %admin.id,
        email = %admin.email,
        "Admin account created from environment variables"
    );
    Ok(Some(admin))
}

/// Generate a random password that passes the strength rules.
#[must_use]
pub fn generate_password(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();

    loop {
        let password: String = (0..length)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        if is_strong_password(&password) || length < 8 {
            return password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use tempfile::TempDir;

    fn seed(email: &str, password: &str) -> AdminSeed {
        AdminSeed {
            name: "  Site   Admin ".to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_create_admin() {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::open(dir.path()).unwrap();

        let admin = create_admin(
            &store,
            &seed(" Admin@Example.com ", "Secure#Pass123"),
            "default-user-icon.jpg",
        )
        .unwrap();

        assert_eq!(admin.email, "admin@example.com");
        assert_eq!(admin.name, "Site Admin");
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_active());
        assert!(verify_password("Secure#Pass123", &admin.password_hash).unwrap());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_create_admin_rejects_bad_seed() {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::open(dir.path()).unwrap();

        assert!(matches!(
            create_admin(&store, &seed("nope", "Secure#Pass123"), "x.jpg"),
            Err(AuthError::Config(_))
        ));
        assert!(matches!(
            create_admin(&store, &seed("a@b.com", "weak"), "x.jpg"),
            Err(AuthError::Config(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_generate_password() {
        let p1 = generate_password(16);
        let p2 = generate_password(16);
        assert_eq!(p1.len(), 16);
        assert_ne!(p1, p2);
        assert!(is_strong_password(&p1));
    }

    #[test]
    fn test_seed_debug_hides_password() {
        let debug = format!("{:?}", seed("a@b.com", "Secure#Pass123"));
        assert!(!debug.contains("Secure#Pass123"));
    }
}
