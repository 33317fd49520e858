use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};

use crate::{
    error::Result, models::StreamInfo, routes::download::video_id_param, state::AppState,
};

/// GET /stream/mp3/{video_id}
pub async fn stream_mp3(
    State(state): State<AppState>,
    video_id: Result<Path<String>, PathRejection>,
) -> Result<Json<StreamInfo>> {
    let video_id = video_id_param(video_id)?;
    let info = state.resolver.resolve_stream(&video_id).await?;
    Ok(Json(info))
}
