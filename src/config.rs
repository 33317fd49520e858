use anyhow::Context;
use serde::Deserialize;

/// Application configuration, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory where transcoded audio and video files are written.
    /// Files are named after the video id, so repeated requests reuse the same path.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,

    /// Path to the yt-dlp binary.
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Optional ffmpeg location passed to yt-dlp for the audio extraction
    /// and merge post-processing steps.
    #[serde(default)]
    pub ffmpeg_path: Option<String>,

    /// Optional HTTP proxy to pass to yt-dlp.
    #[serde(default)]
    pub proxy: Option<String>,

    /// How long a search result list stays valid in the cache, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_downloads_dir() -> String {
    "/tmp/downloads".to_string()
}
fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present; a missing file is fine
        let _ = dotenvy::dotenv();

        envy::from_env::<AppConfig>().context("Failed to load config from environment")
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}
