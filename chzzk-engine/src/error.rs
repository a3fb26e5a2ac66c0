use thiserror::Error;

/// Errors raised by the engine's HTTP, playlist, and auth layers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response status: {0}")]
    StatusCode(reqwest::StatusCode),

    #[error("authentication expired (401/403)")]
    AuthExpired,

    #[error("playlist parse error: {0}")]
    PlaylistParse(String),

    #[error("no session available: {0}")]
    SessionMissing(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
