//! # Usergate Gateway
//!
//! Session authentication and user-management HTTP API.
//!
//! The auth core verifies credentials, issues signed session cookies,
//! validates and revokes sessions, gates routes by role, and runs the
//! password reset flow. The handlers expose it under `/api/users`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
/// HTTP error mapping.
pub mod error;
/// Request handlers.
pub mod handlers;
/// Reset mail delivery.
pub mod mail;
mod middleware;
mod server;
/// Persistence collaborators.
pub mod store;
/// Profile image uploads.
pub mod upload;

pub use auth::{AuthError, AuthState, JwtManager, SessionContext};
pub use error::ApiError;
pub use mail::{LogMailer, MailError, Mailer, ResetMail};
pub use middleware::LoginRateLimiter;
pub use server::{AppState, Gateway, GatewayBuilder, SWEEP_INTERVAL, build_router};
pub use store::{Account, AccountError, AccountStore, PublicAccount, StoreError, Visibility};
pub use upload::{ImagePolicy, UploadError};

use usergate_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
