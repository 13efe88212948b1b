use axum::{
    Json,
    extract::{Path, State},
};
use kinema_core::service::VideoDetails;
use kinema_core::types::VideoHash;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

/// Unrecognized videos are returned too, with `recognized = false` and no
/// cross reference.
pub async fn get_video_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> AppResult<Json<VideoDetails>> {
    let hash = VideoHash::parse(&hash)?;
    state
        .service()
        .video_details(&hash)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no video with hash {}", hash.as_str())))
}
