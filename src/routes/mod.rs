pub mod download;
pub mod search;
pub mod stream;

use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::{
    compression::{
        CompressionLayer,
        predicate::{DefaultPredicate, NotForContentType, Predicate},
    },
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::Result, state::AppState};

pub fn build_router(state: AppState) -> Router {
    // CORS: the search API is meant to be called from any origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Media files are already compressed; only gzip the JSON.
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new()
            .and(NotForContentType::const_new("audio/"))
            .and(NotForContentType::const_new("video/")),
    );

    Router::new()
        .route("/", get(search::index))
        .route("/recherche", get(search::search))
        .route("/telecharger/mp3/{video_id}", get(download::download_mp3))
        .route("/telecharger/mp4/{video_id}", get(download::download_mp4))
        .route("/stream/mp3/{video_id}", get(stream::stream_mp3))
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Indented JSON with non-ASCII characters left as-is.
pub fn pretty_json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response> {
    let body = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    Ok((
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        )],
        body,
    )
        .into_response())
}
