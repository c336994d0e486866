use async_trait::async_trait;
use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
    http::StatusCode,
};
use tracing::warn;

use super::{
    photos::{is_image, PhotoUpload},
    services::INVALID_FILE_TYPE,
};
use crate::{error::ApiError, state::AppState};

/// Multipart form field carrying the photo.
pub const PROFILE_FIELD: &str = "profile";

/// Decodes the `profile` part of a multipart body. Rejects non-image parts
/// and parts over the configured size. A body without a `profile` part yields
/// `None`; the service decides how to report it once the user is looked up.
pub struct ProfileUpload(pub Option<PhotoUpload>);

#[async_trait]
impl FromRequest<AppState> for ProfileUpload {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        while let Some(field) = multipart.next_field().await.map_err(reject)? {
            if field.name() != Some(PROFILE_FIELD) {
                continue;
            }

            let content_type = field.content_type().unwrap_or_default().to_owned();
            if !is_image(&content_type) {
                warn!(%content_type, "rejected non-image upload");
                return Err(ApiError::BadRequest(INVALID_FILE_TYPE.into()));
            }
            let original_name = field.file_name().map(str::to_owned);
            let body = field.bytes().await.map_err(reject)?;
            if body.len() > state.config.max_photo_bytes {
                warn!(size = body.len(), "rejected oversized upload");
                return Err(ApiError::PayloadTooLarge);
            }

            return Ok(ProfileUpload(Some(PhotoUpload {
                body,
                content_type,
                original_name,
            })));
        }

        Ok(ProfileUpload(None))
    }
}

fn reject(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
