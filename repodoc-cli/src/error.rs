//! Error handling for the RepoDoc CLI
//!
//! Commands return [`CliResult`]; the error carries the exit code the
//! process should end with and keeps the underlying cause for the report.

use crate::exit_codes::{EXIT_ERROR, EXIT_WARNING};
use repodoc::{ErrorKind, GatewayError};
use std::error::Error;
use std::fmt;

/// CLI-specific result type that preserves error information
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type that includes both error information and suggested exit code
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl CliError {
    /// Create a new CLI error with a message and exit code
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
            source: None,
        }
    }

    /// Wrap `error` under a short description of what was being attempted
    pub fn from_error<E: Error + Send + Sync + 'static>(
        context: impl Into<String>,
        error: E,
        exit_code: i32,
    ) -> Self {
        Self {
            message: context.into(),
            exit_code,
            source: Some(Box::new(error)),
        }
    }

    /// The message followed by every cause, one per line
    pub fn full_chain(&self) -> String {
        let mut result = self.message.clone();

        let mut current_source = self.source();
        while let Some(err) = current_source {
            result.push_str(&format!("\n  Caused by: {}", err));
            current_source = err.source();
        }

        result
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Gateway failures that mean the command could not run at all end with
/// [`EXIT_ERROR`]; failures of the call itself end with [`EXIT_WARNING`].
impl From<GatewayError> for CliError {
    fn from(error: GatewayError) -> Self {
        let (context, exit_code) = match error.kind() {
            ErrorKind::InvalidRequest => ("Invalid tool call", EXIT_ERROR),
            ErrorKind::ConnectionUnavailable => ("Tool server unavailable", EXIT_ERROR),
            ErrorKind::Config => ("Invalid configuration", EXIT_ERROR),
            _ => ("Tool call failed", EXIT_WARNING),
        };
        Self::from_error(context, error, exit_code)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::from_error("Failed to render output", error, EXIT_ERROR)
    }
}

/// Convert a CliResult to an exit code, printing the full error chain if needed
pub fn handle_cli_result(result: CliResult<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e.full_chain());
            e.exit_code
        }
    }
}
