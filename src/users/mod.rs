pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod model;
pub mod photos;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router(max_photo_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::profile_routes(max_photo_bytes))
}
