//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - Session credential signing and verification
//! - Credential checks against stored account hashes
//! - Session validation with revocation lookups
//! - Role and anonymous gates
//! - The password reset flow
//! - Axum extractors composing the above

pub mod cookie;
mod credentials;
mod jwt;
mod middleware;
pub mod password;
mod reset;
mod session;
/// First-run bootstrap of the admin account.
pub mod setup;

pub use credentials::CredentialVerifier;
pub use jwt::{Claims, IssuedCredential, JwtManager};
pub use middleware::{
    AlreadyLoggedIn, Anonymous, AnonymousMessage, AuthState, Authenticated, PasswordRecovery,
    RequireAdmin,
};
pub use reset::{PasswordReset, generate_reset_token};
pub use session::{SessionContext, SessionValidator};

use thiserror::Error;

use crate::store::{AccountError, StoreError};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. The message is identical for both.
    #[error("Incorrect email and/or password")]
    InvalidCredentials,

    /// Credentials matched a disabled account.
    #[error("This account has been deactivated. Contact an administrator for more information")]
    AccountDisabled,

    /// Missing, malformed, tampered, or expired session credential.
    #[error("You are not logged in")]
    NotAuthenticated,

    /// The session credential was explicitly logged out.
    #[error("This session has been logged out")]
    SessionRevoked,

    /// Permission denied.
    #[error("{0}")]
    PermissionDenied(String),

    /// Unknown, expired, or already used reset token.
    #[error("The password reset token is invalid or has expired")]
    InvalidResetToken,

    /// Current password did not match on a password change.
    #[error("The current password is incorrect")]
    IncorrectPassword,

    /// New password equals the current one.
    #[error("The new password must be different from the current one")]
    PasswordUnchanged,

    /// Revocation or reset store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Account store failure.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Credential signing failed.
    #[error("Token error: {0}")]
    Token(String),

    /// Password hashing failed.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}
