mod cache;
mod config;
mod error;
mod models;
mod provider;
mod resolver;
mod routes;
mod search;
mod state;
mod ytdlp;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    cache::ResultCache, provider::MediaProvider, resolver::DownloadResolver,
    search::SearchService, state::AppState, ytdlp::YtDlp,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mp3juice=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let config = config::AppConfig::from_env()?;
    info!("Starting mp3juice, binding to {}", config.bind);

    // Ensure downloads directory exists
    tokio::fs::create_dir_all(&config.downloads_dir).await?;

    // ── Media provider ───────────────────────────────────────────────────────
    let provider: Arc<dyn MediaProvider> = Arc::new(YtDlp::from_config(&config));
    info!("Using yt-dlp at {}", config.ytdlp_path);

    // ── Application state ─────────────────────────────────────────────────────
    // One cache per process; it lives as long as the server.
    let cache = ResultCache::new(config.cache_ttl());
    let state = AppState {
        search: Arc::new(SearchService::new(cache, Arc::clone(&provider))),
        resolver: Arc::new(DownloadResolver::new(&config.downloads_dir, provider)),
    };

    // ── HTTP server ───────────────────────────────────────────────────────────
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, router).await?;

    Ok(())
}
