//! Outbound password-reset mail.

use async_trait::async_trait;
use thiserror::Error;

/// Mail delivery errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// The transport refused or failed the delivery.
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// A password-reset message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetMail {
    /// Sender display address.
    pub from: String,
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Reset link carrying the token.
    pub link: String,
}

impl ResetMail {
    /// Compose the reset mail for `to`.
    #[must_use]
    pub fn new(from: &str, to: &str, host_url: &str, token: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Password reset".to_string(),
            link: reset_link(host_url, token),
        }
    }

    /// Plain-text body.
    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "A password reset was requested for this account.\n\n\
             Follow this link to choose a new password:\n{}\n\n\
             If you did not request it, ignore this message.",
            self.link
        )
    }
}

/// Link to the frontend reset page.
#[must_use]
pub fn reset_link(host_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={token}", host_url.trim_end_matches('/'))
}

/// Delivers reset mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `mail`.
    async fn send(&self, mail: ResetMail) -> Result<(), MailError>;
}

/// Mailer that records deliveries through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: ResetMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Reset mail sent");
        tracing::debug!(link = %mail.link, "Reset mail link");
        Ok(())
    }
}
