use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Category of a failed or rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential missing or still set to the placeholder.
    Configuration,
    /// Network-level failure, including an expired request deadline.
    Transport,
    /// The provider answered with a non-success status.
    RemoteRejected,
    /// The provider answered with a body we could not interpret.
    Protocol,
    /// A request was already in flight.
    Busy,
    /// The in-flight request was cancelled before it settled.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::RemoteRejected => "remote_rejected",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Busy => "busy",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while obtaining a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Provider rejected request with status {status}: {message}")]
    RemoteRejected {
        status: u16,
        message: String,
        /// Response body exactly as received
        body: String,
    },

    #[error("Unexpected response from provider: {message}")]
    Protocol {
        message: String,
        body: Option<String>,
    },

    #[error("Request cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompletionError::Configuration(_) => ErrorKind::Configuration,
            CompletionError::Transport(_) | CompletionError::Timeout(_) => ErrorKind::Transport,
            CompletionError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            CompletionError::Protocol { .. } => ErrorKind::Protocol,
            CompletionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status carried by a rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw provider response body, when the failure came with one.
    pub fn body(&self) -> Option<&str> {
        match self {
            CompletionError::RemoteRejected { body, .. } => Some(body.as_str()),
            CompletionError::Protocol { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        CompletionError::Protocol {
            message: message.into(),
            body: None,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::protocol(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Rejections returned synchronously by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("A request is already in progress")]
    Busy,
}

impl SubmitError {
    pub fn kind(self) -> ErrorKind {
        match self {
            SubmitError::Busy => ErrorKind::Busy,
        }
    }
}
