//! Prediction client error types.

use std::error::Error as StdError;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Result type for prediction operations.
pub type PredictResult<T> = Result<T, PredictError>;

/// Errors that can occur while submitting an image for prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Failed to read image: {0}")]
    Read(String),

    #[error("Failed to stage image: {0}")]
    Staging(#[source] io::Error),

    #[error("Network error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Prediction service returned {status} {reason}")]
    Server {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a [`PredictError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Read,
    Staging,
    Transport,
    Timeout,
    Server,
    MalformedResponse,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Read => "read",
            ErrorKind::Staging => "staging",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Config => "config",
        }
    }
}

impl PredictError {
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a server error from a non-success status.
    ///
    /// `reason` is the phrase from the status line; the standard phrase for
    /// the code is used when the server sent none.
    pub fn server(
        status: reqwest::StatusCode,
        reason: Option<&str>,
        body: impl Into<String>,
    ) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| status.canonical_reason())
            .unwrap_or("Unknown Status");

        Self::Server {
            status: status.as_u16(),
            reason: reason.to_string(),
            body: body.into(),
        }
    }

    /// Classify a transport failure as a timeout or a plain network error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if is_timeout(&err) {
            Self::Timeout(describe_chain(&err))
        } else {
            Self::Transport(err)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::Read(_) => ErrorKind::Read,
            PredictError::Staging(_) => ErrorKind::Staging,
            PredictError::Transport(_) => ErrorKind::Transport,
            PredictError::Timeout(_) => ErrorKind::Timeout,
            PredictError::Server { .. } => ErrorKind::Server,
            PredictError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            PredictError::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status, if the server answered.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            PredictError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for showing in place of a prediction.
    pub fn user_message(&self) -> String {
        match self {
            PredictError::Server { reason, .. } => format!("Prediction Failed: {}", reason),
            PredictError::Transport(e) => format!("Error: {}", describe_chain(e)),
            other => format!("Error: {}", other),
        }
    }
}

/// True if a timeout appears anywhere in the error's source chain.
fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// reqwest's top-level message is terse ("error sending request"); append the
/// innermost cause so "connection refused" and DNS failures are visible.
fn describe_chain(err: &reqwest::Error) -> String {
    let mut root: &dyn StdError = err;
    while let Some(next) = root.source() {
        root = next;
    }

    let top = err.to_string();
    let cause = root.to_string();
    if cause == top {
        top
    } else {
        format!("{}: {}", top, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_server_error_carries_status_reason() {
        let err = PredictError::server(StatusCode::INTERNAL_SERVER_ERROR, None, "boom");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.http_status(), Some(500));
        assert_eq!(err.user_message(), "Prediction Failed: Internal Server Error");
    }

    #[test]
    fn test_server_error_unknown_status() {
        let status = StatusCode::from_u16(599).unwrap();
        let err = PredictError::server(status, None, "");
        assert!(err.user_message().contains("Unknown Status"));
    }

    #[test]
    fn test_server_error_prefers_sent_reason() {
        let err = PredictError::server(StatusCode::SERVICE_UNAVAILABLE, Some("Model Warming Up"), "");
        assert_eq!(err.user_message(), "Prediction Failed: Model Warming Up");

        let err = PredictError::server(StatusCode::SERVICE_UNAVAILABLE, Some("  "), "");
        assert_eq!(err.user_message(), "Prediction Failed: Service Unavailable");
    }

    #[test]
    fn test_user_message_prefixes_error() {
        let err = PredictError::read("No image selected");
        assert_eq!(err.user_message(), "Error: Failed to read image: No image selected");

        let err = PredictError::Timeout("operation timed out".to_string());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.user_message().contains("timed out"));
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::MalformedResponse.as_str(), "malformed_response");
        assert_eq!(
            serde_json::to_string(&ErrorKind::MalformedResponse).unwrap(),
            "\"malformed_response\""
        );
        assert_eq!(PredictError::malformed("x").kind(), ErrorKind::MalformedResponse);
        assert_eq!(PredictError::config("x").kind(), ErrorKind::Config);
    }
}
