use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::{error, warn};

/// Message shown on a form when something unexpected failed server-side.
pub const SERVER_ERROR: &str = "Server error";

const SERVER_ERROR_PAGE: &str = "<!doctype html><title>Server error</title><h1>Server error</h1>";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("session lifetime {0} is out of range")]
    SessionExpiry(chrono::TimeDelta),

    #[error("spawn_blocking join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Multipart(e) => {
                warn!("Rejected multipart body: {}", e);
                (e.status(), e.body_text()).into_response()
            }
            other => {
                error!("{}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, Html(SERVER_ERROR_PAGE)).into_response()
            }
        }
    }
}
