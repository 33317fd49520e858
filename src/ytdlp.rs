/// Wrapper around the `yt-dlp` CLI.
///
/// Every call spawns one subprocess with `-J`, so yt-dlp prints a single JSON
/// document describing what it resolved (and, with `--no-simulate`, what it
/// downloaded). Failures surface the `ERROR:` lines from stderr.
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::{
    config::AppConfig,
    provider::{ExtractRequest, FlatEntry, MediaInfo, MediaProvider},
};

#[derive(Debug, Clone)]
pub struct YtDlp {
    pub ytdlp_path: String,
    pub ffmpeg_path: Option<String>,
    pub proxy: Option<String>,
}

impl YtDlp {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            proxy: config.proxy.clone(),
        }
    }

    /// Arguments shared by every invocation.
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
        ];
        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
        args
    }

    fn search_args(&self, query: &str, limit: u32) -> Vec<String> {
        let mut args = self.common_args();
        // Flat mode: one request for the result page, none per video.
        args.push("--flat-playlist".to_string());
        args.push(format!("ytsearch{limit}:{query}"));
        args
    }

    fn extract_args(&self, req: &ExtractRequest) -> Vec<String> {
        let mut args = self.common_args();
        args.push("--no-playlist".to_string());
        args.push("-f".to_string());
        args.push(req.format.to_string());

        if req.download {
            // -J implies --simulate; undo that so the file is actually written.
            args.push("--no-simulate".to_string());
        }
        if let Some(template) = &req.output_template {
            args.push("-o".to_string());
            args.push(template.to_string_lossy().into_owned());
        }
        if let Some(audio) = &req.extract_audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(audio.codec.to_string());
            args.push("--audio-quality".to_string());
            args.push(format!("{}K", audio.bitrate_kbps));
        }
        if let Some(container) = req.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }
        if let Some(ffmpeg) = self.ffmpeg_path.as_deref().filter(|p| !p.is_empty()) {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string());
        }

        // Guard against ids starting with '-' being read as options.
        args.push("--".to_string());
        args.push(req.url.clone());
        args
    }

    async fn run(&self, args: &[String]) -> anyhow::Result<Vec<u8>> {
        tracing::debug!("[yt-dlp] {} {}", self.ytdlp_path, args.join(" "));

        let out = Command::new(&self.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn {}", self.ytdlp_path))?;

        let stderr = String::from_utf8_lossy(&out.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!("[yt-dlp stderr] {line}");
        }

        if !out.status.success() {
            bail!(
                "yt-dlp exited with status {}\n{}",
                out.status.code().unwrap_or(-1),
                summarize_stderr(&stderr),
            );
        }

        Ok(out.stdout)
    }
}

#[async_trait]
impl MediaProvider for YtDlp {
    async fn search_flat(&self, query: &str, limit: u32) -> anyhow::Result<Vec<Option<FlatEntry>>> {
        let stdout = self.run(&self.search_args(query, limit)).await?;
        parse_search_output(&stdout)
    }

    async fn extract(&self, request: &ExtractRequest) -> anyhow::Result<MediaInfo> {
        let stdout = self.run(&self.extract_args(request)).await?;
        serde_json::from_slice(&stdout).context("parse yt-dlp info JSON")
    }
}

#[derive(Deserialize)]
struct SearchPlaylist {
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

fn parse_search_output(stdout: &[u8]) -> anyhow::Result<Vec<Option<FlatEntry>>> {
    let playlist: SearchPlaylist =
        serde_json::from_slice(stdout).context("parse yt-dlp search JSON")?;
    Ok(playlist.entries)
}

/// Keep only the lines that explain a failure; fall back to the tail of stderr.
fn summarize_stderr(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}
