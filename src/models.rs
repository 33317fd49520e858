use serde::{Deserialize, Serialize};

// ── Search ────────────────────────────────────────────────────────────────────

/// One shaped search hit, as returned by `GET /recherche`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "titre")]
    pub title: String,
    #[serde(rename = "duree")]
    pub duration_display: String,
    #[serde(rename = "duree_secondes")]
    pub duration_seconds: Option<u64>,
    #[serde(rename = "image_url")]
    pub thumbnail_url: String,
    /// Placeholder estimates; flat search never fetches real sizes.
    pub taille_mp3: String,
    pub taille_mp4: String,
    pub video_id: String,
    #[serde(rename = "youtube_url")]
    pub source_url: String,
    #[serde(flatten)]
    pub download_links: DownloadLinks,
}

/// Action links, derived from the video id alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLinks {
    #[serde(rename = "telecharger_mp3")]
    pub audio: String,
    #[serde(rename = "telecharger_mp4")]
    pub video: String,
    #[serde(rename = "stream_mp3")]
    pub stream: String,
}

impl DownloadLinks {
    pub fn for_video(video_id: &str) -> Self {
        Self {
            audio: format!("/telecharger/mp3/{video_id}"),
            video: format!("/telecharger/mp4/{video_id}"),
            stream: format!("/stream/mp3/{video_id}"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub recherche: String,
    pub nombre_resultats: usize,
    pub resultats: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct SearchErrorResponse {
    pub recherche: String,
    pub error: String,
    pub resultats: Vec<SearchResult>,
}

// ── Download / stream ─────────────────────────────────────────────────────────

/// What a download or stream request asks for. Consumed once by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Audio,
    Video,
    Stream,
}

impl std::fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadKind::Audio => "audio",
            DownloadKind::Video => "video",
            DownloadKind::Stream => "stream",
        };
        write!(f, "{s}")
    }
}

/// A file produced by yt-dlp, ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: std::path::PathBuf,
    /// Name offered to the client, e.g. `"Some Song.mp3"`.
    pub filename: String,
    pub mime: &'static str,
}

/// Response of `GET /stream/mp3/{video_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub titre: Option<String>,
    pub stream_url: String,
    pub duree: String,
}

// ── Index ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RouteIndex {
    pub message: &'static str,
    pub routes: RouteList,
    pub exemple: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RouteList {
    pub recherche: &'static str,
    pub telecharger_mp3: &'static str,
    pub telecharger_mp4: &'static str,
    pub stream_mp3: &'static str,
}

impl Default for RouteIndex {
    fn default() -> Self {
        Self {
            message: "API MP3 Juice - Recherche et téléchargement de musique",
            routes: RouteList {
                recherche: "/recherche?audio=<votre_recherche>",
                telecharger_mp3: "/telecharger/mp3/<video_id>",
                telecharger_mp4: "/telecharger/mp4/<video_id>",
                stream_mp3: "/stream/mp3/<video_id>",
            },
            exemple: "/recherche?audio=odyai",
        }
    }
}

/// Render seconds as `M:SS`; minutes are not wrapped into hours.
/// Absent or zero durations render as `"N/A"`.
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s > 0.0 => {
            let total = s as u64;
            format!("{}:{:02}", total / 60, total % 60)
        }
        _ => "N/A".to_string(),
    }
}
