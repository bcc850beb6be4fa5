//! Email and password verification.

use std::sync::Arc;

use usergate_core::Identity;

use super::AuthError;
use super::password::verify_password_blocking;
use crate::store::{AccountStore, Visibility};

/// Checks login credentials against stored account hashes. Read-only.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    accounts: Arc<AccountStore>,
}

impl CredentialVerifier {
    /// Create a verifier over `accounts`.
    #[must_use]
    pub const fn new(accounts: Arc<AccountStore>) -> Self {
        Self { accounts }
    }

    /// Verify `email` and `password`, yielding the account's identity.
    ///
    /// Disabled accounts are looked up too, so that a correct password on a
    /// disabled account reports the deactivation instead of a generic failure.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email or a
    /// wrong password alike, and `AuthError::AccountDisabled` for a disabled
    /// account with the right password.
    pub async fn verify(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let Some(account) = self
            .accounts
            .find_by_email(email, Visibility::IncludeDisabled)?
        else {
            tracing::debug!("Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            verify_password_blocking(password.to_string(), account.password_hash.clone()).await?;
        if !matches {
            tracing::debug!(account_id = %account.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active() {
            tracing::info!(account_id = %account.id, "Login attempt on disabled account");
            return Err(AuthError::AccountDisabled);
        }

        Ok(account.identity())
    }
}
