use axum::{
    body::Body,
    extract::{Path, State, rejection::PathRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::{
    error::{AppError, Result},
    models::DownloadedFile,
    state::AppState,
};

/// GET /telecharger/mp3/{video_id}
pub async fn download_mp3(
    State(state): State<AppState>,
    video_id: Result<Path<String>, PathRejection>,
) -> Result<Response> {
    let video_id = video_id_param(video_id)?;
    let file = state.resolver.download_audio(&video_id).await?;
    send_file(file).await
}

/// GET /telecharger/mp4/{video_id}
pub async fn download_mp4(
    State(state): State<AppState>,
    video_id: Result<Path<String>, PathRejection>,
) -> Result<Response> {
    let video_id = video_id_param(video_id)?;
    let file = state.resolver.download_video(&video_id).await?;
    send_file(file).await
}

/// Unwrap the `{video_id}` segment, reporting undecodable ids (e.g. `%FF`)
/// as a JSON 400 instead of axum's plain-text rejection.
pub(crate) fn video_id_param(path: Result<Path<String>, PathRejection>) -> Result<String> {
    path.map(|Path(id)| id).map_err(|e| AppError::validation(e.body_text()))
}

/// Stream a file from disk as an attachment.
async fn send_file(file: DownloadedFile) -> Result<Response> {
    let handle = tokio::fs::File::open(&file.path).await?;
    let len = handle.metadata().await?.len();
    tracing::info!(
        "Sending {} ({} bytes) as {:?}",
        file.path.display(),
        len,
        file.filename
    );

    let body = Body::from_stream(ReaderStream::new(handle));
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(file.mime)),
        (header::CONTENT_LENGTH, HeaderValue::from(len)),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&file.filename),
        ),
    ];
    Ok((headers, body).into_response())
}

/// `attachment` disposition carrying the title: a quoted ASCII fallback for
/// old clients plus the exact UTF-8 name in `filename*` (RFC 6266).
fn content_disposition(filename: &str) -> HeaderValue {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for b in filename.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => encoded.push(b as char),
            _ => encoded.push_str(&format!("%{b:02X}")),
        }
    }

    let value = format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}");
    // Only visible ASCII and spaces were written above.
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
