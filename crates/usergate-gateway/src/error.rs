//! HTTP boundary errors.
//!
//! Every failure that reaches a handler is converted into [`ApiError`], and
//! [`ApiError::status`] is the only place where kinds meet status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use usergate_core::{FieldMessage, QueryError};

use crate::auth::AuthError;
use crate::store::{AccountError, StoreError};
use crate::upload::UploadError;

/// Error kinds exposed to API callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Bad credentials, missing or invalid session, disabled account.
    #[error("{0}")]
    NotAuthorized(String),

    /// Session was logged out.
    #[error("{0}")]
    Revoked(String),

    /// Wrong role, active session where none is allowed, or a restricted
    /// self-targeting action.
    #[error("{0}")]
    Permission(String),

    /// Reset token invalid, expired, or used.
    #[error("{0}")]
    Token(String),

    /// Per-field input failures.
    #[error("Validation failed")]
    Validation(Vec<FieldMessage>),

    /// Semantically invalid input.
    #[error("{0}")]
    InvalidParam(String),

    /// Invalid pagination, sort, or filter parameters, or an unknown id.
    #[error("{0}")]
    Query(String),

    /// Disallowed upload type.
    #[error("{0}")]
    MediaType(String),

    /// Upload too large.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Uniqueness conflict.
    #[error("{0}")]
    Conflict(String),

    /// Too many attempts.
    #[error("{0}")]
    RateLimited(String),

    /// A backing store failed or timed out; safe to retry.
    #[error("{0}")]
    Unavailable(String),

    /// Unhandled failure. The message is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Status and machine-readable code for this kind.
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotAuthorized(_) => (StatusCode::FORBIDDEN, "not_authorized"),
            Self::Revoked(_) => (StatusCode::FORBIDDEN, "session_revoked"),
            Self::Permission(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            Self::Token(_) => (StatusCode::NOT_FOUND, "invalid_token"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            Self::InvalidParam(_) => (StatusCode::BAD_REQUEST, "invalid_param"),
            Self::Query(_) => (StatusCode::NOT_ACCEPTABLE, "invalid_query"),
            Self::MediaType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'static str,
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    errors: &'a [FieldMessage],
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        match &self {
            Self::Validation(errors) => {
                (status, Json(ValidationBody { errors, code })).into_response()
            }
            Self::Internal(cause) => {
                tracing::error!(error = %cause, "Internal error");
                let body = ErrorBody {
                    error: "Internal server error",
                    code,
                };
                (status, Json(body)).into_response()
            }
            Self::Unavailable(cause) => {
                tracing::warn!(error = %cause, "Backing store unavailable");
                let body = ErrorBody {
                    error: "Service temporarily unavailable, try again",
                    code,
                };
                (status, Json(body)).into_response()
            }
            other => {
                let message = other.to_string();
                let body = ErrorBody {
                    error: &message,
                    code,
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::NotAuthenticated
            | AuthError::IncorrectPassword => Self::NotAuthorized(e.to_string()),
            AuthError::SessionRevoked => Self::Revoked(e.to_string()),
            AuthError::PermissionDenied(message) => Self::Permission(message),
            AuthError::InvalidResetToken => Self::Token(e.to_string()),
            AuthError::PasswordUnchanged => Self::InvalidParam(e.to_string()),
            AuthError::Store(e) => e.into(),
            AuthError::Account(e) => e.into(),
            AuthError::Token(_) | AuthError::Hashing(_) | AuthError::Config(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Conflict(email) => {
                Self::Conflict(format!("An account already uses {email}"))
            }
            AccountError::NotFound(id) => Self::Query(format!("No user with id {id}")),
            AccountError::Storage(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self::Query(e.to_string())
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::UnsupportedType(_) => Self::MediaType(e.to_string()),
            UploadError::TooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
            UploadError::Io(_) => Self::Internal(e.to_string()),
        }
    }
}
