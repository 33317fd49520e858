/// The media-resolution seam: everything the service needs from yt-dlp.
///
/// Handlers never talk to yt-dlp directly; they go through `MediaProvider`
/// so the cache and format policy can be exercised without a network.
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

// ── Provider output ────────────────────────────────────────────────────────────

/// A lightweight candidate from flat search. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlatEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

/// Result of a full extraction of one video.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    /// Direct, time-limited media URL of the selected format.
    pub url: Option<String>,
}

// ── Provider input ─────────────────────────────────────────────────────────────

/// Post-download audio transcode (`-x --audio-format … --audio-quality …`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: &'static str,
    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub url: String,
    /// yt-dlp format selector expression.
    pub format: &'static str,
    /// Output template; `%(ext)s` is filled in by yt-dlp.
    pub output_template: Option<PathBuf>,
    pub extract_audio: Option<AudioTranscode>,
    pub merge_output_format: Option<&'static str>,
    /// When false, only metadata is resolved and nothing is written to disk.
    pub download: bool,
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Flat search: up to `limit` candidates without per-video metadata.
    /// Entries the platform could not describe come back as `None`.
    async fn search_flat(&self, query: &str, limit: u32) -> anyhow::Result<Vec<Option<FlatEntry>>>;

    /// Full extraction, optionally downloading and post-processing to disk.
    async fn extract(&self, request: &ExtractRequest) -> anyhow::Result<MediaInfo>;
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
