use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use engine::compose::CompositionError;
use engine::media::MediaError;
use serde::Serialize;
use thiserror::Error;

use crate::gemini::GeminiFailure;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API key not configured. Set {env_var} in .env")]
    MissingKey {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{provider} API request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to download media: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to download media: server returned {0}")]
    Status(u16),

    #[error("Failed to write media: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid media id {0:?}")]
    InvalidMediaId(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Google API key not configured. Set GOOGLE_API_KEY in .env")]
    MissingKey,

    #[error("No audio data in TTS response")]
    NoAudio,

    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("TTS audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write narration WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Google API key not configured. Set GOOGLE_API_KEY in .env")]
    MissingKey,

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response contained no text")]
    Empty,
}

impl From<GeminiFailure> for SynthesisError {
    fn from(failure: GeminiFailure) -> Self {
        match failure {
            GeminiFailure::MissingKey => SynthesisError::MissingKey,
            GeminiFailure::Http(err) => SynthesisError::Http(err),
            GeminiFailure::Status { status, body } => SynthesisError::Status { status, body },
        }
    }
}

impl From<GeminiFailure> for LlmError {
    fn from(failure: GeminiFailure) -> Self {
        match failure {
            GeminiFailure::MissingKey => LlmError::MissingKey,
            GeminiFailure::Http(err) => LlmError::Http(err),
            GeminiFailure::Status { status, body } => LlmError::Status { status, body },
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("score must be between 1 and 5, got {0}")]
    InvalidScore(u8),

    #[error("invalid {column} value in row: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("database lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Provider,
    Download,
    Synthesis,
    Llm,
    Composition,
    Store,
    NotFound,
    InvalidInput,
}

impl ErrorKind {
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Provider | ErrorKind::Download | ErrorKind::Synthesis | ErrorKind::Llm => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Config => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Composition | ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors that can cross the tool boundary.
pub trait ToolError: std::fmt::Display {
    fn kind(&self) -> ErrorKind;
}

impl ToolError for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

impl ToolError for ProviderError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::MissingKey { .. } => ErrorKind::Config,
            _ => ErrorKind::Provider,
        }
    }
}

impl ToolError for DownloadError {
    fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::InvalidMediaId(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Download,
        }
    }
}

impl ToolError for SynthesisError {
    fn kind(&self) -> ErrorKind {
        match self {
            SynthesisError::MissingKey => ErrorKind::Config,
            _ => ErrorKind::Synthesis,
        }
    }
}

impl ToolError for LlmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LlmError::MissingKey => ErrorKind::Config,
            _ => ErrorKind::Llm,
        }
    }
}

impl ToolError for CompositionError {
    fn kind(&self) -> ErrorKind {
        match self {
            CompositionError::NoClips | CompositionError::InvalidOutputName(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Composition,
        }
    }
}

impl ToolError for MediaError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Composition
    }
}

impl ToolError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidScore(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Store,
        }
    }
}

/// Response envelope for tool calls: `{"status":"success", ..payload}` or
/// `{"status":"error","kind":..,"error_message":..}`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult<T> {
    Success(T),
    Error {
        kind: ErrorKind,
        error_message: String,
    },
}

impl<T> ToolResult<T> {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ToolResult::Error {
            kind,
            error_message: message.into(),
        }
    }
}

impl<T, E: ToolError> From<Result<T, E>> for ToolResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ToolResult::Success(value),
            Err(err) => ToolResult::error(err.kind(), err.to_string()),
        }
    }
}

impl<T: Serialize> IntoResponse for ToolResult<T> {
    fn into_response(self) -> Response {
        let status = match &self {
            ToolResult::Success(_) => StatusCode::OK,
            ToolResult::Error { kind, .. } => kind.status_code(),
        };
        (status, Json(self)).into_response()
    }
}
