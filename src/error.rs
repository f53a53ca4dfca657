use std::fmt;
use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Per-request variants map onto exactly one HTTP status via [`Error::status`]; the startup
/// variants never reach a client.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing, or the route/method is not served.
    #[error("{0}")]
    Validation(String),

    /// The client asked for a model other than the one this process loaded.
    #[error("model '{requested}' is not available (loaded model is '{loaded}')")]
    ModelMismatch { requested: String, loaded: String },

    /// Anything surfaced by the engine, including grammar that fails to parse.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The request body grew past the configured cap.
    #[error("request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The model directory is missing or is not a directory.
    #[error("model directory not found: '{}'", .0.display())]
    ModelDirectory(PathBuf),

    /// The in-flight gauge could not be created or registered.
    #[error("metrics setup failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::ModelMismatch { .. } => StatusCode::NOT_FOUND,
            Self::Engine(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ModelDirectory(_) | Self::Metrics(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Opaque failure reported by an [`crate::engine::Engine`].
///
/// The orchestration layer never inspects engine errors; it only carries the message to the
/// client and the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError(String);

impl EngineError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}
