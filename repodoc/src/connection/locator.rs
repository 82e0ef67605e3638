//! Tool-server executable discovery

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use std::path::PathBuf;

/// Finds the tool-server executable.
///
/// Searches the configured paths in order, then falls back to a `PATH` lookup
/// of the binary name.
#[derive(Debug, Clone)]
pub struct ServerLocator {
    candidates: Vec<PathBuf>,
    binary_name: Option<String>,
}

impl ServerLocator {
    /// Locator probing exactly `candidates` and nothing on `PATH`
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            binary_name: None,
        }
    }

    /// Locator built from the configured paths and binary name
    pub fn from_config(config: &GatewayConfig) -> Self {
        let binary_name = Some(config.server_binary_name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Self {
            candidates: config.candidate_server_paths(),
            binary_name,
        }
    }

    /// Also search `PATH` for `name` after the explicit candidates
    pub fn with_path_lookup(mut self, name: impl Into<String>) -> Self {
        self.binary_name = Some(name.into());
        self
    }

    /// Resolve the executable, or report every location searched
    pub fn locate(&self) -> Result<PathBuf> {
        let mut searched = Vec::with_capacity(self.candidates.len() + 1);

        for candidate in &self.candidates {
            if candidate.is_file() {
                tracing::debug!("Found tool server at {}", candidate.display());
                return Ok(candidate.clone());
            }
            searched.push(candidate.clone());
        }

        if let Some(name) = &self.binary_name {
            match which::which(name) {
                Ok(path) => {
                    tracing::debug!("Found tool server on PATH at {}", path.display());
                    return Ok(path);
                }
                Err(e) => {
                    tracing::trace!("'{}' not on PATH: {}", name, e);
                    searched.push(PathBuf::from(name));
                }
            }
        }

        Err(GatewayError::ConnectionUnavailable { searched })
    }
}
