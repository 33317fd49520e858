/// Search orchestration: cache first, then a flat yt-dlp search shaped into
/// `SearchResult`s.
use std::{num::IntErrorKind, sync::Arc};

use crate::{
    cache::ResultCache,
    error::{AppError, Result},
    models::{DownloadLinks, SearchResult, format_duration},
    provider::{FlatEntry, MediaProvider, watch_url},
};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 20;

/// Flat search does not fetch sizes; these are shown instead.
const ESTIMATED_MP3_SIZE: &str = "~3-5 MB";
const ESTIMATED_MP4_SIZE: &str = "~10-50 MB";

/// Coerce the raw `limit` query parameter into `1..=MAX_LIMIT`.
/// Never rejects: missing or unparsable input falls back to `DEFAULT_LIMIT`.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_LIMIT;
    };
    match raw.trim().parse::<i64>() {
        Ok(n) => n.clamp(1, MAX_LIMIT as i64) as u32,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => MAX_LIMIT,
            IntErrorKind::NegOverflow => 1,
            _ => DEFAULT_LIMIT,
        },
    }
}

/// Turn a flat-search entry into the public result shape.
pub fn shape_entry(entry: FlatEntry) -> SearchResult {
    let video_id = entry.id.unwrap_or_default();
    let title = entry.title.unwrap_or_else(|| "Unknown".to_string());

    let thumbnail_url = entry
        .thumbnail
        .filter(|t| !t.is_empty())
        .or_else(|| {
            entry
                .thumbnails
                .last()
                .and_then(|t| t.url.clone())
                .filter(|u| !u.is_empty())
        })
        .or_else(|| {
            (!video_id.is_empty())
                .then(|| format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"))
        })
        .unwrap_or_default();

    SearchResult {
        title,
        duration_display: format_duration(entry.duration),
        duration_seconds: entry.duration.filter(|d| *d > 0.0).map(|d| d as u64),
        thumbnail_url,
        taille_mp3: ESTIMATED_MP3_SIZE.to_string(),
        taille_mp4: ESTIMATED_MP4_SIZE.to_string(),
        source_url: watch_url(&video_id),
        download_links: DownloadLinks::for_video(&video_id),
        video_id,
    }
}

pub struct SearchService {
    cache: ResultCache,
    provider: Arc<dyn MediaProvider>,
}

impl SearchService {
    pub fn new(cache: ResultCache, provider: Arc<dyn MediaProvider>) -> Self {
        Self { cache, provider }
    }

    /// Search for `query`, returning at most `limit` shaped results.
    /// Repeated calls within the cache TTL do not reach the provider.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResult>> {
        if let Some(cached) = self.cache.lookup(query, limit) {
            tracing::debug!("Cache hit for {query:?} (limit {limit})");
            return Ok(cached);
        }

        tracing::info!("Searching for {query:?} (limit {limit})");
        let entries = self
            .provider
            .search_flat(query, limit)
            .await
            .map_err(|e| {
                tracing::warn!("Search failed for {query:?}: {e:#}");
                AppError::Provider(format!("{e:#}"))
            })?;

        let results: Vec<SearchResult> = entries.into_iter().flatten().map(shape_entry).collect();

        self.cache.store(query, limit, results.clone());
        tracing::debug!(
            "Cached {} result(s) for {query:?}; {} cached search(es)",
            results.len(),
            self.cache.len()
        );

        Ok(results)
    }
}
