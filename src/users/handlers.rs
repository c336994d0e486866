use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use super::{
    dto::ProfileEntry,
    extractors::ProfileUpload,
    model::{Fields, User},
    photos::content_type_for,
};
use crate::{error::ApiResult, state::AppState};

/// Room for multipart boundaries and part headers on top of the photo itself.
pub(crate) const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/profiles", get(list_profiles))
}

pub fn profile_routes(max_photo_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/users/:id/profile",
            get(get_profile)
                .post(upload_profile)
                .patch(replace_profile)
                .delete(delete_profile),
        )
        .layer(DefaultBodyLimit::max(max_photo_bytes + MULTIPART_OVERHEAD))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Fields>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(fields) = payload?;
    let user = state.users.create(fields).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.users.list().await)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.users.get(&id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Fields>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(patch) = payload?;
    Ok(Json(state.users.update(&id, patch).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /users/:id/profile (multipart, field `profile`)
#[instrument(skip(state, upload))]
pub async fn upload_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ProfileUpload(upload): ProfileUpload,
) -> ApiResult<Json<User>> {
    Ok(Json(state.users.upload_photo(&id, upload).await?))
}

/// PATCH /users/:id/profile (multipart, field `profile`)
#[instrument(skip(state, upload))]
pub async fn replace_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ProfileUpload(upload): ProfileUpload,
) -> ApiResult<Json<User>> {
    Ok(Json(state.users.replace_photo(&id, upload).await?))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let (name, stream) = state.users.open_photo(&id).await?;
    let body = Body::from_stream(ReaderStream::new(stream));
    Ok(([(header::CONTENT_TYPE, content_type_for(&name))], body).into_response())
}

#[instrument(skip(state))]
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.users.delete_photo(&id).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn list_profiles(State(state): State<AppState>) -> Json<Vec<ProfileEntry>> {
    Json(state.users.list_profiles().await)
}
