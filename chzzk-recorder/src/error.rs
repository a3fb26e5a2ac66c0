//! Application-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error. `ConfigFatal` is the only variant the coordinator acts
/// on specially (it exits the process before the main loop starts); everything else
/// is logged and the current tick continues.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("fatal configuration error: {0}")]
    ConfigFatal(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("authentication expired")]
    AuthExpired,

    #[error("engine error: {0}")]
    Engine(#[from] chzzk_engine::EngineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigFatal(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Fatal-configuration errors exit the process before the main loop starts;
    /// everything else is recoverable and only logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::ConfigFatal(_))
    }
}
