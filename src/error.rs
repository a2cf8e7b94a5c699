use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("sync coordinator is not running")]
    CoordinatorStopped,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("logging setup error: {0}")]
    Logging(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

/// Failure of a single poll request. Never terminal: the previous snapshot
/// stays in place and the failure only feeds the poll health flag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PollError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return Self::Status(status.as_u16());
        }
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::Transport(value.to_string())
    }
}

impl From<simd_json::Error> for PollError {
    fn from(value: simd_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<AppError> for PollError {
    fn from(value: AppError) -> Self {
        match value {
            AppError::Reqwest(error) => error.into(),
            AppError::SimdJson(error) => error.into(),
            AppError::InvalidArgument(reason) | AppError::Protocol(reason) => Self::Decode(reason),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl serde::Serialize for PollError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
