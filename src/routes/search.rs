use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::{RouteIndex, SearchErrorResponse, SearchResponse},
    routes::pretty_json,
    search::parse_limit,
    state::AppState,
};

const SEARCH_USAGE: &str = "/recherche?audio=<votre_recherche>&limit=10";

#[derive(Deserialize)]
pub struct SearchQuery {
    pub audio: Option<String>,
    pub limit: Option<String>,
}

/// GET /
pub async fn index() -> Result<Response> {
    pretty_json(StatusCode::OK, &RouteIndex::default())
}

/// GET /recherche?audio=...&limit=...
///
/// Provider failures are reported in the body with a 200, alongside an
/// empty result list.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Response> {
    let limit = parse_limit(params.limit.as_deref());
    let query = params.audio.unwrap_or_default();

    if query.is_empty() {
        return Err(AppError::Validation {
            message: "Paramètre \"audio\" requis".to_string(),
            usage: Some(SEARCH_USAGE),
        });
    }

    match state.search.search(&query, limit).await {
        Ok(results) => pretty_json(
            StatusCode::OK,
            &SearchResponse {
                recherche: query,
                nombre_resultats: results.len(),
                resultats: results,
            },
        ),
        Err(AppError::Provider(message)) => pretty_json(
            StatusCode::OK,
            &SearchErrorResponse {
                recherche: query,
                error: message,
                resultats: Vec::new(),
            },
        ),
        Err(e) => Err(e),
    }
}
