//! Unified error handling for the RepoDoc gateway
//!
//! Every failure a tool call can hit is one variant of [`GatewayError`]. The
//! first six variants are the gateway's error categories; the rest are
//! transport plumbing that the gateway maps onto those categories.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the RepoDoc library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The call description could not be turned into a tool call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The tool-server executable was not found at any known location
    #[error("Tool server executable not found (searched: {})", display_paths(.searched))]
    ConnectionUnavailable {
        /// Every location that was searched, in search order
        searched: Vec<PathBuf>,
    },

    /// The tool server answered with a JSON-RPC error envelope
    #[error("Tool server error {code}: {message}")]
    ToolError {
        /// JSON-RPC error code
        code: i64,
        /// Server-provided message
        message: String,
    },

    /// The response line was not JSON at any unwrap tier
    #[error("Could not decode tool server response: {0}")]
    DecodeFailure(String),

    /// No response arrived within the bound
    #[error("No response from tool server within {duration:?}")]
    Timeout {
        /// The bound that was exceeded
        duration: Duration,
    },

    /// The subprocess exited unexpectedly or could not be terminated cleanly
    #[error("Tool server process failure: {0}")]
    ProcessFailure(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error from the fallback backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Category of a [`GatewayError`], used by callers that branch on the kind of
/// failure rather than on its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed call description
    InvalidRequest,
    /// Executable not found
    ConnectionUnavailable,
    /// Server error envelope
    ToolError,
    /// Unparseable response
    DecodeFailure,
    /// Response bound exceeded
    Timeout,
    /// Subprocess died or could not be stopped
    ProcessFailure,
    /// Configuration problem
    Config,
}

impl GatewayError {
    /// Map this error onto its gateway category.
    ///
    /// IO errors on the process pipes count as process failures; JSON and
    /// HTTP errors count as decode failures since both mean the payload
    /// could not be read.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            GatewayError::ConnectionUnavailable { .. } => ErrorKind::ConnectionUnavailable,
            GatewayError::ToolError { .. } => ErrorKind::ToolError,
            GatewayError::DecodeFailure(_) | GatewayError::Json(_) | GatewayError::Http(_) => {
                ErrorKind::DecodeFailure
            }
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::ProcessFailure(_) | GatewayError::Io(_) => ErrorKind::ProcessFailure,
            GatewayError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the connection that produced this error must be discarded
    /// before the next call from the same owner.
    pub fn tears_down_connection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::ProcessFailure)
    }

    /// Create a process failure from anything displayable
    pub fn process(message: impl Into<String>) -> Self {
        GatewayError::ProcessFailure(message.into())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
