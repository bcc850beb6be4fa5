//! HTTP handlers.

pub mod users;

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{FromRef, FromRequest, Request, rejection::JsonRejection},
    http::{StatusCode, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use usergate_core::field_messages;
use validator::Validate;

use crate::error::ApiError;
use crate::upload::{ImagePolicy, UploadError};

/// JSON body that has passed its [`Validate`] rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| match rejection {
                JsonRejection::MissingJsonContentType(_) => {
                    ApiError::MediaType("Expected a JSON request body".to_string())
                }
                other => ApiError::InvalidParam(other.body_text()),
            })?;

        value
            .validate()
            .map_err(|errors| ApiError::Validation(field_messages(&errors)))?;

        Ok(Self(value))
    }
}

/// Raw image body with an accepted content type.
///
/// The content type is checked before the body is read, so a disallowed
/// upload is refused without buffering it.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// File extension matching the content type.
    pub extension: &'static str,
    /// Image bytes, at most the policy limit.
    pub bytes: Bytes,
}

impl<S> FromRequest<S> for ImageUpload
where
    S: Send + Sync,
    Arc<ImagePolicy>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let policy = Arc::<ImagePolicy>::from_ref(state);
        let content_type = req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let extension = ImagePolicy::extension_for(content_type)?;

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::from(UploadError::TooLarge {
                    max: policy.max_bytes(),
                })
            } else {
                ApiError::InvalidParam(rejection.body_text())
            }
        })?;
        policy.check_size(bytes.len())?;

        Ok(Self { extension, bytes })
    }
}
