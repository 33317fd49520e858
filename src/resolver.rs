/// Turns a video id plus a download kind into a concrete yt-dlp request, then
/// maps the outcome to a file on disk or a direct stream URL.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use regex::Regex;

use crate::{
    error::{AppError, Missing, Result},
    models::{DownloadKind, DownloadedFile, StreamInfo, format_duration},
    provider::{AudioTranscode, ExtractRequest, MediaInfo, MediaProvider, watch_url},
};

// ── Format policy ──────────────────────────────────────────────────────────────

const AUDIO_FORMAT: &str = "bestaudio/best";

/// Lowest quality at or below 360p, preferring mp4. Each `/` is a fallback:
///   1. smallest mp4 video + m4a audio within the height cap
///   2. smallest pre-muxed mp4 within the cap
///   3. smallest mp4 video + m4a audio, any height
///   4. smallest pre-muxed mp4, any height
///   5. smallest anything
const VIDEO_FORMAT: &str = "worstvideo[ext=mp4][height<=360]+worstaudio[ext=m4a]\
/worst[ext=mp4][height<=360]\
/worstvideo[ext=mp4]+worstaudio[ext=m4a]\
/worst[ext=mp4]\
/worst";

const AUDIO_CODEC: &str = "mp3";
const AUDIO_BITRATE_KBPS: u32 = 192;
const AUDIO_MIME: &str = "audio/mpeg";

/// Extensions yt-dlp may leave behind when the mp3 extraction step is skipped
/// or fails silently, checked in this order.
const AUDIO_FALLBACKS: &[(&str, &str)] = &[
    ("m4a", "audio/mp4"),
    ("webm", "audio/webm"),
    ("opus", "audio/opus"),
];

const VIDEO_CONTAINER: &str = "mp4";
const VIDEO_MIME: &str = "video/mp4";

/// Reject anything that could escape the downloads directory or be read as
/// a yt-dlp option.
pub fn validate_video_id(video_id: &str) -> Result<()> {
    static RE_VIDEO_ID: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

    if RE_VIDEO_ID.is_match(video_id) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Identifiant vidéo invalide: {video_id:?}"
        )))
    }
}

pub struct DownloadResolver {
    downloads_dir: PathBuf,
    provider: Arc<dyn MediaProvider>,
    /// One lock per output path; concurrent requests for the same file wait
    /// for each other instead of racing on the same path.
    in_flight: InFlightMap,
}

impl DownloadResolver {
    pub fn new(downloads_dir: impl Into<PathBuf>, provider: Arc<dyn MediaProvider>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            provider,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    // ── Requests ───────────────────────────────────────────────────────────────

    pub fn audio_request(&self, video_id: &str) -> ExtractRequest {
        ExtractRequest {
            url: watch_url(video_id),
            format: AUDIO_FORMAT,
            output_template: Some(self.downloads_dir.join(format!("{video_id}.%(ext)s"))),
            extract_audio: Some(AudioTranscode {
                codec: AUDIO_CODEC,
                bitrate_kbps: AUDIO_BITRATE_KBPS,
            }),
            merge_output_format: None,
            download: true,
        }
    }

    pub fn video_request(&self, video_id: &str) -> ExtractRequest {
        ExtractRequest {
            url: watch_url(video_id),
            format: VIDEO_FORMAT,
            output_template: Some(self.video_path(video_id)),
            extract_audio: None,
            merge_output_format: Some(VIDEO_CONTAINER),
            download: true,
        }
    }

    pub fn stream_request(&self, video_id: &str) -> ExtractRequest {
        ExtractRequest {
            url: watch_url(video_id),
            format: AUDIO_FORMAT,
            output_template: None,
            extract_audio: None,
            merge_output_format: None,
            download: false,
        }
    }

    fn video_path(&self, video_id: &str) -> PathBuf {
        self.downloads_dir
            .join(format!("{video_id}.{VIDEO_CONTAINER}"))
    }

    // ── Operations ─────────────────────────────────────────────────────────────

    /// Download and transcode to mp3, falling back to whatever audio
    /// container yt-dlp left on disk.
    pub async fn download_audio(&self, video_id: &str) -> Result<DownloadedFile> {
        validate_video_id(video_id)?;
        let primary = self.downloads_dir.join(format!("{video_id}.{AUDIO_CODEC}"));

        let info = self
            .extract_exclusive(&primary, DownloadKind::Audio, &self.audio_request(video_id))
            .await?;
        let title = info.title.unwrap_or_else(|| video_id.to_string());

        let (path, ext, mime) = locate_audio(&self.downloads_dir, video_id)
            .await
            .ok_or(AppError::NotFound(Missing::DownloadedFile))?;
        if ext != AUDIO_CODEC {
            tracing::warn!("No {AUDIO_CODEC} produced for {video_id}, serving .{ext} instead");
        }

        Ok(DownloadedFile {
            path,
            filename: format!("{title}.{ext}"),
            mime,
        })
    }

    /// Download the lowest-quality mp4 rendition.
    pub async fn download_video(&self, video_id: &str) -> Result<DownloadedFile> {
        validate_video_id(video_id)?;
        let path = self.video_path(video_id);

        let info = self
            .extract_exclusive(&path, DownloadKind::Video, &self.video_request(video_id))
            .await?;
        let title = info.title.unwrap_or_else(|| video_id.to_string());

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::NotFound(Missing::DownloadedFile));
        }

        Ok(DownloadedFile {
            path,
            filename: format!("{title}.{VIDEO_CONTAINER}"),
            mime: VIDEO_MIME,
        })
    }

    /// Resolve the direct, time-limited audio URL without downloading.
    pub async fn resolve_stream(&self, video_id: &str) -> Result<StreamInfo> {
        validate_video_id(video_id)?;
        let info = self.extract(DownloadKind::Stream, &self.stream_request(video_id)).await?;

        let stream_url = info
            .url
            .filter(|u| !u.is_empty())
            .ok_or(AppError::NotFound(Missing::StreamUrl))?;

        Ok(StreamInfo {
            titre: info.title,
            stream_url,
            duree: format_duration(info.duration),
        })
    }

    // ── Internals ──────────────────────────────────────────────────────────────

    async fn extract(&self, kind: DownloadKind, request: &ExtractRequest) -> Result<MediaInfo> {
        tracing::info!("Resolving {kind} for {}", request.url);
        self.provider.extract(request).await.map_err(|e| {
            tracing::warn!("yt-dlp {kind} extraction failed for {}: {e:#}", request.url);
            AppError::Provider(format!("{e:#}"))
        })
    }

    /// Run `extract` while holding the lock for `output`.
    async fn extract_exclusive(
        &self,
        output: &Path,
        kind: DownloadKind,
        request: &ExtractRequest,
    ) -> Result<MediaInfo> {
        let entry = InFlight::join(&self.in_flight, output);
        let _held = entry.lock.lock().await;
        self.extract(kind, request).await
    }
}

type InFlightMap = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// A claim on one output path's lock. Dropping it, whether the download
/// finished or the request future was cancelled, removes the map entry once
/// no other request holds a claim.
struct InFlight<'a> {
    map: &'a InFlightMap,
    key: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn join(map: &'a InFlightMap, key: &Path) -> Self {
        let mut in_flight = map.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(in_flight.entry(key.to_path_buf()).or_default());
        Self {
            map,
            key: key.to_path_buf(),
            lock,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&self.lock) == 2 {
            in_flight.remove(&self.key);
        }
    }
}

/// Find the audio file produced for `video_id`: the mp3 first, then each
/// fallback extension in order.
async fn locate_audio(dir: &Path, video_id: &str) -> Option<(PathBuf, &'static str, &'static str)> {
    let candidates =
        std::iter::once((AUDIO_CODEC, AUDIO_MIME)).chain(AUDIO_FALLBACKS.iter().copied());
    for (ext, mime) in candidates {
        let path = dir.join(format!("{video_id}.{ext}"));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some((path, ext, mime));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::provider::testing::MockProvider;

    fn resolver(dir: &Path, provider: Arc<MockProvider>) -> DownloadResolver {
        DownloadResolver::new(dir, provider)
    }

    fn titled(title: &str) -> MediaInfo {
        MediaInfo {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    #[test]
    fn audio_request_transcodes_to_mp3_192() {
        let r = resolver(Path::new("/dl"), Arc::new(MockProvider::default()));
        let req = r.audio_request("abc");
        assert_eq!(req.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(req.format, "bestaudio/best");
        assert_eq!(req.output_template, Some(PathBuf::from("/dl/abc.%(ext)s")));
        assert_eq!(
            req.extract_audio,
            Some(AudioTranscode {
                codec: "mp3",
                bitrate_kbps: 192
            })
        );
        assert!(req.download);
    }

    #[test]
    fn video_request_prefers_smallest_mp4_under_360p() {
        let r = resolver(Path::new("/dl"), Arc::new(MockProvider::default()));
        let req = r.video_request("abc");
        let chain: Vec<&str> = req.format.split('/').collect();
        assert_eq!(
            chain,
            [
                "worstvideo[ext=mp4][height<=360]+worstaudio[ext=m4a]",
                "worst[ext=mp4][height<=360]",
                "worstvideo[ext=mp4]+worstaudio[ext=m4a]",
                "worst[ext=mp4]",
                "worst",
            ]
        );
        assert_eq!(req.merge_output_format, Some("mp4"));
        assert_eq!(req.output_template, Some(PathBuf::from("/dl/abc.mp4")));
    }

    #[test]
    fn stream_request_does_not_download() {
        let r = resolver(Path::new("/dl"), Arc::new(MockProvider::default()));
        let req = r.stream_request("abc");
        assert!(!req.download);
        assert!(req.output_template.is_none());
        assert_eq!(req.format, "bestaudio/best");
    }

    #[test]
    fn video_ids_are_validated() {
        assert!(validate_video_id("dQw4w9WgXcQ").is_ok());
        assert!(validate_video_id("a-b_c").is_ok());
        assert!(validate_video_id("").is_err());
        assert!(validate_video_id("../etc/passwd").is_err());
        assert!(validate_video_id("a b").is_err());
    }

    #[tokio::test]
    async fn audio_download_returns_mp3_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            info: titled("My Song"),
            creates: vec!["abc.mp3".into(), "abc.m4a".into()],
            ..Default::default()
        });
        let file = resolver(dir.path(), provider).download_audio("abc").await.unwrap();
        assert_eq!(file.path, dir.path().join("abc.mp3"));
        assert_eq!(file.filename, "My Song.mp3");
        assert_eq!(file.mime, "audio/mpeg");
    }

    #[tokio::test]
    async fn audio_download_falls_back_to_m4a() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            info: titled("My Song"),
            creates: vec!["abc.m4a".into(), "abc.webm".into()],
            ..Default::default()
        });
        let file = resolver(dir.path(), provider).download_audio("abc").await.unwrap();
        assert_eq!(file.path, dir.path().join("abc.m4a"));
        assert_eq!(file.filename, "My Song.m4a");
        assert_eq!(file.mime, "audio/mp4");
    }

    #[tokio::test]
    async fn audio_download_without_output_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::with_info(titled("My Song")));
        let err = resolver(dir.path(), provider).download_audio("abc").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(Missing::DownloadedFile)));
    }

    #[tokio::test]
    async fn audio_download_title_defaults_to_video_id() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            creates: vec!["abc.opus".into()],
            ..Default::default()
        });
        let file = resolver(dir.path(), provider).download_audio("abc").await.unwrap();
        assert_eq!(file.filename, "abc.opus");
        assert_eq!(file.mime, "audio/opus");
    }

    #[tokio::test]
    async fn video_download_requires_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            info: titled("Clip"),
            creates: vec!["abc.mp4".into()],
            ..Default::default()
        });
        let file = resolver(dir.path(), Arc::clone(&provider))
            .download_video("abc")
            .await
            .unwrap();
        assert_eq!(file.filename, "Clip.mp4");
        assert_eq!(file.mime, "video/mp4");
        assert_eq!(provider.last_request().unwrap().merge_output_format, Some("mp4"));

        let empty = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::with_info(titled("Clip")));
        let err = resolver(empty.path(), provider).download_video("abc").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(Missing::DownloadedFile)));
    }

    #[tokio::test]
    async fn provider_failure_is_a_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            extract_error: Some("ERROR: Video unavailable".into()),
            ..Default::default()
        });
        let err = resolver(dir.path(), provider).download_video("abc").await.unwrap_err();
        assert!(matches!(&err, AppError::Provider(m) if m.contains("Video unavailable")));
    }

    #[tokio::test]
    async fn invalid_id_never_reaches_the_provider() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let r = resolver(dir.path(), Arc::clone(&provider));
        let err = r.download_audio("../../x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(provider.extract_calls(), 0);
    }

    #[tokio::test]
    async fn stream_returns_direct_url() {
        let provider = Arc::new(MockProvider::with_info(MediaInfo {
            title: Some("Song".into()),
            duration: Some(185.0),
            url: Some("https://media.example/audio?sig=1".into()),
        }));
        let info = resolver(Path::new("/unused"), provider)
            .resolve_stream("abc")
            .await
            .unwrap();
        assert_eq!(info.titre.as_deref(), Some("Song"));
        assert_eq!(info.stream_url, "https://media.example/audio?sig=1");
        assert_eq!(info.duree, "3:05");
    }

    #[tokio::test]
    async fn stream_without_url_is_not_found() {
        let provider = Arc::new(MockProvider::with_info(titled("Song")));
        let err = resolver(Path::new("/unused"), provider)
            .resolve_stream("abc")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(Missing::StreamUrl)));
    }

    #[tokio::test]
    async fn in_flight_lock_is_released_after_download() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider {
            creates: vec!["abc.mp4".into()],
            ..Default::default()
        });
        let r = resolver(dir.path(), provider);
        r.download_video("abc").await.unwrap();
        assert!(r.in_flight.lock().unwrap().is_empty());
    }

    /// Sleeps inside `extract` and records how many calls overlap.
    #[derive(Default)]
    struct SlowProvider {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MediaProvider for SlowProvider {
        async fn search_flat(
            &self,
            _query: &str,
            _limit: u32,
        ) -> anyhow::Result<Vec<Option<crate::provider::FlatEntry>>> {
            Ok(Vec::new())
        }

        async fn extract(&self, request: &ExtractRequest) -> anyhow::Result<MediaInfo> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if let Some(template) = &request.output_template {
                std::fs::write(template, b"media")?;
            }
            Ok(MediaInfo::default())
        }
    }

    #[tokio::test]
    async fn same_output_path_downloads_run_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SlowProvider::default());
        let r = DownloadResolver::new(dir.path(), Arc::clone(&provider) as Arc<dyn MediaProvider>);

        let (a, b) = tokio::join!(r.download_video("abc"), r.download_video("abc"));
        a.unwrap();
        b.unwrap();
        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
        assert!(r.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn different_ids_download_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SlowProvider::default());
        let r = DownloadResolver::new(dir.path(), Arc::clone(&provider) as Arc<dyn MediaProvider>);

        let (a, b) = tokio::join!(r.download_video("abc"), r.download_video("def"));
        a.unwrap();
        b.unwrap();
        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
        assert!(r.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_download_releases_its_lock_entry() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SlowProvider::default());
        let r = DownloadResolver::new(dir.path(), Arc::clone(&provider) as Arc<dyn MediaProvider>);

        let outcome =
            tokio::time::timeout(Duration::from_millis(5), r.download_video("abc")).await;
        assert!(outcome.is_err());
        assert!(r.in_flight.lock().unwrap().is_empty());

        r.download_video("abc").await.unwrap();
        assert!(r.in_flight.lock().unwrap().is_empty());
    }
}
