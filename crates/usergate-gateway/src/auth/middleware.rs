//! Authentication extractors for axum.
//!
//! Handlers declare what they need in their signature:
//! - [`Authenticated`]: a validated, non-revoked session
//! - [`RequireAdmin`]: the same, then the admin role gate
//! - [`Anonymous`]: no active session, with a per-route message

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use usergate_core::{Config, Role, config::SessionConfig};

use super::AuthError;
use super::cookie::session_token;
use super::credentials::CredentialVerifier;
use super::jwt::JwtManager;
use super::reset::PasswordReset;
use super::session::{SessionContext, SessionValidator};
use crate::error::ApiError;
use crate::mail::Mailer;
use crate::middleware::LoginRateLimiter;
use crate::store::{
    AccountStore, ResetTokenStore, RevocationStore, SledResetTokenStore, SledRevocationStore,
};

/// Shared authentication state.
pub struct AuthState {
    /// Session settings.
    pub config: SessionConfig,
    /// Credential signer.
    pub jwt: Arc<JwtManager>,
    /// Account store.
    pub accounts: Arc<AccountStore>,
    /// Session validator.
    pub validator: SessionValidator,
    /// Credential verifier.
    pub verifier: CredentialVerifier,
    /// Password reset flow.
    pub reset: PasswordReset,
    /// Revocation store, shared with the validator.
    pub revocations: Arc<dyn RevocationStore>,
    /// Reset-token store, shared with the reset flow.
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    /// Login attempt limiter.
    pub login_limiter: LoginRateLimiter,
}

impl AuthState {
    /// Wire the auth components over `db`.
    ///
    /// # Errors
    ///
    /// Returns error if a store cannot be opened.
    pub fn new(
        config: &Config,
        jwt: JwtManager,
        db: &sled::Db,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AuthError> {
        let session = config.session.clone();
        let jwt = Arc::new(jwt);
        let accounts = Arc::new(AccountStore::with_db(db.clone())?);
        let revocations: Arc<dyn RevocationStore> = Arc::new(SledRevocationStore::open(db)?);
        let reset_tokens: Arc<dyn ResetTokenStore> = Arc::new(SledResetTokenStore::open(db)?);

        let validator =
            SessionValidator::new(jwt.clone(), revocations.clone(), session.store_timeout());
        let verifier = CredentialVerifier::new(accounts.clone());
        let reset = PasswordReset::new(
            accounts.clone(),
            reset_tokens.clone(),
            mailer,
            config.reset.clone(),
            session.store_timeout(),
        );
        let login_limiter = LoginRateLimiter::new(session.login_attempts_per_minute);

        Ok(Self {
            config: session,
            jwt,
            accounts,
            validator,
            verifier,
            reset,
            revocations,
            reset_tokens,
            login_limiter,
        })
    }

    /// Initialize auth state, generating a JWT secret if none is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is malformed or a store cannot be opened.
    pub fn initialize(
        config: &Config,
        db: &sled::Db,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AuthError> {
        let ttl = config.session.ttl();
        let jwt = if let Some(secret) = &config.session.jwt_secret {
            JwtManager::from_hex_secret(secret, ttl)?
        } else {
            tracing::warn!(
                "No JWT secret configured, generated an ephemeral one; \
                 sessions will not survive a restart"
            );
            JwtManager::new(&JwtManager::generate_secret(), ttl)
        };

        Self::new(config, jwt, db, mailer)
    }
}

impl AuthState {
    /// Delete expired revocation and reset-token entries and forget idle
    /// rate-limit keys.
    pub async fn sweep_expired(&self) {
        match self.revocations.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Purged expired revocations"),
            Err(e) => tracing::warn!(error = %e, "Revocation sweep failed"),
        }
        match self.reset_tokens.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Purged expired reset tokens"),
            Err(e) => tracing::warn!(error = %e, "Reset token sweep failed"),
        }
        self.login_limiter.retain_recent();
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("jwt", &self.jwt)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

/// A request carrying a valid, non-revoked session.
#[derive(Debug, Clone)]
pub struct Authenticated(pub SessionContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthState>::from_ref(state);
        let session = auth.validator.validate(session_token(&parts.headers)).await?;
        Ok(Self(session))
    }
}

/// A valid session whose role is admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub SessionContext);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(session) = Authenticated::from_request_parts(parts, state).await?;
        session.require_role(Role::Admin)?;
        Ok(Self(session))
    }
}

/// Message reported when an anonymous-only route sees an active session.
pub trait AnonymousMessage: Send + Sync + 'static {
    /// User-facing message.
    const MESSAGE: &'static str;
}

/// Default message for login.
#[derive(Debug, Clone, Copy)]
pub struct AlreadyLoggedIn;

impl AnonymousMessage for AlreadyLoggedIn {
    const MESSAGE: &'static str = "You are already logged in";
}

/// Message for the password recovery routes.
#[derive(Debug, Clone, Copy)]
pub struct PasswordRecovery;

impl AnonymousMessage for PasswordRecovery {
    const MESSAGE: &'static str = "You cannot use password recovery while logged in";
}

/// A request with no active session.
///
/// Absent, malformed, expired, and revoked cookies all pass.
#[derive(Debug, Clone, Copy)]
pub struct Anonymous<M: AnonymousMessage = AlreadyLoggedIn>(PhantomData<M>);

impl<S, M> FromRequestParts<S> for Anonymous<M>
where
    S: Send + Sync,
    M: AnonymousMessage,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthState>::from_ref(state);
        auth.validator
            .ensure_anonymous(session_token(&parts.headers), M::MESSAGE)
            .await?;
        Ok(Self(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::LogMailer;
    use axum::http::{HeaderValue, Request, header::COOKIE};
    use tempfile::TempDir;
    use usergate_core::Identity;

    fn state() -> (TempDir, Arc<AuthState>) {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let mut config = Config::default();
        config.session.jwt_secret = Some(JwtManager::generate_hex_secret());
        let auth = AuthState::initialize(&config, &db, Arc::new(LogMailer)).unwrap();
        (dir, Arc::new(auth))
    }

    fn parts(token: Option<&str>) -> Parts {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        if let Some(token) = token {
            request.headers_mut().insert(
                COOKIE,
                HeaderValue::from_str(&format!("jwt={token}")).unwrap(),
            );
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_authenticated_extractor() {
        let (_dir, auth) = state();
        let issued = auth.jwt.issue(&Identity::new("u1", Role::User)).unwrap();

        let Authenticated(session) =
            Authenticated::from_request_parts(&mut parts(Some(&issued.token)), &auth)
                .await
                .unwrap();
        assert_eq!(session.account_id(), "u1");

        let err = Authenticated::from_request_parts(&mut parts(None), &auth)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_require_admin_extractor() {
        let (_dir, auth) = state();
        let user = auth.jwt.issue(&Identity::new("u1", Role::User)).unwrap();
        let admin = auth.jwt.issue(&Identity::new("a1", Role::Admin)).unwrap();

        let err = RequireAdmin::from_request_parts(&mut parts(Some(&user.token)), &auth)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Permission(_)));

        assert!(
            RequireAdmin::from_request_parts(&mut parts(Some(&admin.token)), &auth)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_anonymous_extractor_message() {
        let (_dir, auth) = state();
        let issued = auth.jwt.issue(&Identity::new("u1", Role::User)).unwrap();

        assert!(
            Anonymous::<PasswordRecovery>::from_request_parts(&mut parts(None), &auth)
                .await
                .is_ok()
        );

        let mut with_session = parts(Some(&issued.token));
        let err = Anonymous::<PasswordRecovery>::from_request_parts(&mut with_session, &auth)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Permission(PasswordRecovery::MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        use std::time::Duration;

        let (_dir, auth) = state();
        auth.revocations
            .revoke("stale", Duration::from_millis(1))
            .await
            .unwrap();
        auth.revocations
            .revoke("fresh", Duration::from_secs(60))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        auth.sweep_expired().await;
        assert_eq!(auth.revocations.purge_expired().await.unwrap(), 0);
        assert!(auth.revocations.is_revoked("fresh").await.unwrap());
    }
}
