use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// What a request expected to find and did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// yt-dlp returned but no output file exists at the expected path.
    DownloadedFile,
    /// yt-dlp resolved the video but yielded no direct media URL.
    StreamUrl,
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Missing::DownloadedFile => "Fichier non trouvé après téléchargement",
            Missing::StreamUrl => "URL non trouvée",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        usage: Option<&'static str>,
    },

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    NotFound(Missing),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            usage: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(Missing::StreamUrl) => StatusCode::NOT_FOUND,
            AppError::NotFound(Missing::DownloadedFile)
            | AppError::Provider(_)
            | AppError::Io(_)
            | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation {
                message,
                usage: Some(usage),
            } => json!({ "error": message, "usage": usage }),
            AppError::Provider(m) => {
                tracing::warn!("Provider error: {m}");
                json!({ "error": m })
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {e}");
                json!({ "error": self.to_string() })
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unhandled error: {e:#}");
                json!({ "error": e.to_string() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
