//! Session validation and the gates built on it.
//!
//! Signature and expiry are always checked before the revocation store is
//! consulted, so structurally invalid tokens never cost a store lookup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use usergate_core::{Identity, Role};

use super::AuthError;
use super::jwt::{Claims, JwtManager};
use crate::store::{RevocationStore, bounded};

/// A validated session, passed explicitly to whatever runs after the
/// validator.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Resolved principal.
    pub identity: Identity,
    /// Raw credential, kept for revocation on logout.
    pub token: String,
    /// Credential expiry.
    pub expires_at: DateTime<Utc>,
}

impl SessionContext {
    fn from_claims(claims: &Claims, token: &str) -> Self {
        Self {
            identity: claims.identity(),
            token: token.to_string(),
            expires_at: claims.expires_at(),
        }
    }

    /// Account ID of the caller.
    #[must_use]
    pub fn account_id(&self) -> &str {
        self.identity.id.as_str()
    }

    /// Role gate: exact match against `required`.
    ///
    /// Only reachable with a context the validator produced.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PermissionDenied` on a role mismatch.
    pub fn require_role(&self, required: Role) -> Result<(), AuthError> {
        if self.identity.role == required {
            Ok(())
        } else {
            tracing::debug!(
                account_id = %self.identity.id,
                role = %self.identity.role,
                required = %required,
                "Role gate rejected request"
            );
            Err(AuthError::PermissionDenied(format!(
                "This action requires the {required} role"
            )))
        }
    }

    /// Time left before the credential stops verifying, at least one
    /// second.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining_at(Utc::now())
    }

    /// Time left at `now`. `exp` has whole-second precision and the
    /// credential verifies until that second ends, so the window runs to
    /// `expires_at + 1s`.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let valid_until = self.expires_at + chrono::Duration::seconds(1);
        (valid_until - now)
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_secs(1))
    }
}

/// Verifies session credentials and consults the revocation store.
#[derive(Clone)]
pub struct SessionValidator {
    jwt: Arc<JwtManager>,
    revocations: Arc<dyn RevocationStore>,
    store_timeout: Duration,
}

impl SessionValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(
        jwt: Arc<JwtManager>,
        revocations: Arc<dyn RevocationStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            jwt,
            revocations,
            store_timeout,
        }
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        Ok(bounded(self.store_timeout, self.revocations.is_revoked(token)).await?)
    }

    /// Resolve a request's credential into a session context.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` for a missing, invalid, or
    /// expired credential, `AuthError::SessionRevoked` for a logged-out
    /// one, and `AuthError::Store` if the revocation lookup fails.
    pub async fn validate(&self, token: Option<&str>) -> Result<SessionContext, AuthError> {
        let token = token.ok_or(AuthError::NotAuthenticated)?;
        let claims = self.jwt.verify(token)?;

        if self.is_revoked(token).await? {
            tracing::debug!(account_id = %claims.sub, "Revoked session presented");
            return Err(AuthError::SessionRevoked);
        }

        Ok(SessionContext::from_claims(&claims, token))
    }

    /// Anonymous gate: fail only when the credential is valid, unexpired,
    /// and not revoked.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PermissionDenied` with `message` when an active
    /// session exists, or `AuthError::Store` if the revocation lookup fails.
    pub async fn ensure_anonymous(
        &self,
        token: Option<&str>,
        message: &str,
    ) -> Result<(), AuthError> {
        let Some(token) = token else {
            return Ok(());
        };
        let Ok(claims) = self.jwt.verify(token) else {
            return Ok(());
        };
        if self.is_revoked(token).await? {
            return Ok(());
        }

        tracing::debug!(account_id = %claims.sub, "Anonymous gate rejected active session");
        Err(AuthError::PermissionDenied(message.to_string()))
    }

    /// Revoke a validated session until its own expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Store` if the write fails.
    pub async fn revoke(&self, session: &SessionContext) -> Result<(), AuthError> {
        let ttl = session.remaining();
        bounded(self.store_timeout, self.revocations.revoke(&session.token, ttl)).await?;
        tracing::info!(account_id = %session.identity.id, "Session revoked");
        Ok(())
    }
}

impl std::fmt::Debug for SessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionValidator")
            .field("jwt", &self.jwt)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
