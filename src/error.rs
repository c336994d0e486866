use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{storage::PhotoError, table::StoreError};

pub type ApiResult<T> = Result<T, ApiError>;

pub const USER_NOT_FOUND: &str = "User not found";
pub const PROFILE_NOT_FOUND: &str = "User profile not found";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("File too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Photo(#[from] PhotoError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::Photo(PhotoError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Store(_) | ApiError::Photo(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::NotFound(_) | ApiError::BadRequest(_) | ApiError::PayloadTooLarge => {
                self.to_string()
            }
            ApiError::Photo(PhotoError::NotFound(_)) => PROFILE_NOT_FOUND.into(),
            ApiError::Store(e) => {
                error!(error = %e, "user table failure");
                "An error occurred while accessing user data".into()
            }
            ApiError::Photo(e) => {
                error!(error = %e, "photo storage failure");
                "An error occurred while processing photo".into()
            }
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".into()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = render(ApiError::NotFound(USER_NOT_FOUND)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({ "message": "User not found" }));

        let (status, body) = render(ApiError::BadRequest("Invalid File Type".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid File Type");

        let (status, _) = render(ApiError::PayloadTooLarge).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn storage_failures_hide_details() {
        let err = ApiError::Store(StoreError::Decode {
            row: 3,
            reason: "secret path /srv/data".into(),
        });
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("/srv/data"));

        let (status, body) = render(ApiError::Photo(PhotoError::NotFound("x.png".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], PROFILE_NOT_FOUND);
    }
}
