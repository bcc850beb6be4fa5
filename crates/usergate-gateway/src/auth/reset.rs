//! Password reset flow.
//!
//! `forgot` issues a token only for registered, active emails and reports
//! success either way. `reset` consumes the token with a single atomic
//! take before touching the password, so two racing resets cannot both
//! succeed. If the password write then fails the token stays consumed.

use std::sync::Arc;

use rand::RngCore;
use usergate_core::config::ResetConfig;

use super::AuthError;
use super::password::hash_password_blocking;
use crate::mail::{Mailer, ResetMail};
use crate::store::{AccountStore, ResetTokenStore, Visibility, bounded};

/// Random reset token, 32 bytes hex-encoded.
#[must_use]
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Drives forgot-password and reset-password.
#[derive(Clone)]
pub struct PasswordReset {
    accounts: Arc<AccountStore>,
    tokens: Arc<dyn ResetTokenStore>,
    mailer: Arc<dyn Mailer>,
    config: ResetConfig,
    store_timeout: std::time::Duration,
}

impl PasswordReset {
    /// Create the flow.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountStore>,
        tokens: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn Mailer>,
        config: ResetConfig,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            accounts,
            tokens,
            mailer,
            config,
            store_timeout,
        }
    }

    /// Handle a forgot-password request.
    ///
    /// Mail failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns error only if a store call fails.
    pub async fn forgot(&self, email: &str) -> Result<(), AuthError> {
        let Some(account) = self.accounts.find_by_email(email, Visibility::ActiveOnly)? else {
            tracing::debug!("Password reset requested for unregistered email");
            return Ok(());
        };

        let token = generate_reset_token();
        bounded(
            self.store_timeout,
            self.tokens.put(&token, &account.email, self.config.token_ttl()),
        )
        .await?;
        tracing::info!(account_id = %account.id, "Password reset token issued");

        let mail = ResetMail::new(
            &self.config.sender,
            &account.email,
            &self.config.host_url,
            &token,
        );
        if let Err(e) = self.mailer.send(mail).await {
            tracing::warn!(account_id = %account.id, error = %e, "Reset mail not delivered");
        }

        Ok(())
    }

    /// Consume `token` and set `new_password` on its account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` for an unknown, expired, or
    /// used token, or one whose account is gone or disabled.
    pub async fn reset(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let email = bounded(self.store_timeout, self.tokens.take(token))
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let Some(account) = self.accounts.find_by_email(&email, Visibility::ActiveOnly)? else {
            tracing::info!("Reset token consumed for missing or disabled account");
            return Err(AuthError::InvalidResetToken);
        };

        let hash = hash_password_blocking(new_password.to_string()).await?;
        self.accounts.set_password(&account.id, hash)?;
        tracing::info!(account_id = %account.id, "Password reset completed");
        Ok(())
    }
}

impl std::fmt::Debug for PasswordReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordReset")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{hash_password, verify_password};
    use crate::mail::MailError;
    use crate::store::{Account, SledResetTokenStore};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use usergate_core::{AccountStatus, Role};

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<ResetMail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: ResetMail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(mail);
            if self.fail {
                Err(MailError::Delivery("smtp down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        accounts: Arc<AccountStore>,
        tokens: Arc<SledResetTokenStore>,
        mailer: Arc<RecordingMailer>,
        flow: PasswordReset,
        account: Account,
    }

    fn fixture(fail_mail: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let accounts = Arc::new(AccountStore::with_db(db.clone()).unwrap());
        let tokens = Arc::new(SledResetTokenStore::open(&db).unwrap());
        let mailer = Arc::new(RecordingMailer {
            fail: fail_mail,
            ..RecordingMailer::default()
        });

        let account = Account::new(
            "John Doe",
            "john@doe.com",
            hash_password("Old#Pass123").unwrap(),
            Role::User,
            "default-user-icon.jpg",
        );
        accounts.create(&account).unwrap();

        let flow = PasswordReset::new(
            accounts.clone(),
            tokens.clone(),
            mailer.clone(),
            ResetConfig::default(),
            Duration::from_secs(1),
        );

        Fixture {
            _dir: dir,
            accounts,
            tokens,
            mailer,
            flow,
            account,
        }
    }

    fn token_from(mail: &ResetMail) -> String {
        mail.link.split("token=").nth(1).unwrap().to_string()
    }

    #[test]
    fn test_generate_reset_token() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[tokio::test]
    async fn test_unregistered_email_creates_nothing() {
        let f = fixture(false);
        f.flow.forgot("nobody@doe.com").await.unwrap();
        assert!(f.mailer.sent.lock().unwrap().is_empty());
        assert!(f.tokens.is_empty());
        assert_eq!(f.tokens.len(), 0);

        f.flow.forgot("john@doe.com").await.unwrap();
        assert_eq!(f.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_forgot_then_reset() {
        let f = fixture(false);
        f.flow.forgot("john@doe.com").await.unwrap();

        let mail = f.mailer.sent.lock().unwrap()[0].clone();
        assert_eq!(mail.to, "john@doe.com");
        let token = token_from(&mail);
        assert_eq!(
            f.tokens.get(&token).await.unwrap().as_deref(),
            Some("john@doe.com")
        );

        f.flow.reset(&token, "New#Pass456").await.unwrap();
        let updated = f
            .accounts
            .find_by_id(&f.account.id, Visibility::ActiveOnly)
            .unwrap()
            .unwrap();
        assert!(verify_password("New#Pass456", &updated.password_hash).unwrap());

        // Second use fails.
        assert!(matches!(
            f.flow.reset(&token, "Other#Pass789").await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let f = fixture(false);
        assert!(matches!(
            f.flow.reset("deadbeef", "New#Pass456").await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_mail_failure_still_succeeds() {
        let f = fixture(true);
        assert!(f.flow.forgot("john@doe.com").await.is_ok());
        assert_eq!(f.mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_reset() {
        let f = fixture(false);
        f.flow.forgot("john@doe.com").await.unwrap();
        let token = token_from(&f.mailer.sent.lock().unwrap()[0]);

        f.accounts
            .set_status(&f.account.id, AccountStatus::Disabled)
            .unwrap();
        assert!(matches!(
            f.flow.reset(&token, "New#Pass456").await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_resets_only_one_wins() {
        let f = fixture(false);
        f.flow.forgot("john@doe.com").await.unwrap();
        let token = token_from(&f.mailer.sent.lock().unwrap()[0]);

        let (a, b) = tokio::join!(
            f.flow.reset(&token, "First#Pass111"),
            f.flow.reset(&token, "Second#Pass222")
        );
        assert_eq!(u8::from(a.is_ok()) + u8::from(b.is_ok()), 1);
    }
}
