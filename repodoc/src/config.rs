//! Configuration management for the RepoDoc gateway
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults
//! 2. Environment variables (`REPODOC_*`, plus the access token variable)
//! 3. An optional YAML file
//!
//! A layer that fails to load or validate is logged and skipped, so the
//! previous layer stays in effect.

use crate::common::env_loader::{read_env, EnvLoader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Variable that names an explicit YAML config file
pub const CONFIG_PATH_ENV: &str = "REPODOC_CONFIG";

/// Default environment variable carrying the GitHub access token
pub const DEFAULT_TOKEN_ENV_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

const DEFAULT_SERVER_PATH: &str = "github-mcp-server/github-mcp-server";
const DEFAULT_FALLBACK_SERVER_PATH: &str = "github-mcp-server/cmd/github-mcp-server/github-mcp-server";
const DEFAULT_SERVER_BINARY: &str = "github-mcp-server";
const DEFAULT_TOOLSETS: [&str; 4] = ["repos", "issues", "pull_requests", "code_security"];
const DEFAULT_CACHE_DIR_NAME: &str = "repodoc_mcp_cache";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path of the file with invalid YAML
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: String,
        /// How to fix it
        hint: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, value: impl ToString, hint: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            hint: hint.to_string(),
        }
    }
}

/// How the gateway reaches the tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayMode {
    /// Spawn a process per call, no cache, fall back to the HTTP API when
    /// the executable is missing
    #[serde(alias = "fresh", alias = "simple")]
    FreshProcess,
    /// Reuse one process per owner and consult the cache first
    #[default]
    #[serde(alias = "optimized")]
    Pooled,
}

impl FromStr for GatewayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" | "fresh-process" | "simple" => Ok(GatewayMode::FreshProcess),
            "pooled" | "optimized" => Ok(GatewayMode::Pooled),
            other => Err(ConfigError::invalid(
                "mode",
                other,
                "mode must be one of: fresh, pooled",
            )),
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayMode::FreshProcess => f.write_str("fresh"),
            GatewayMode::Pooled => f.write_str("pooled"),
        }
    }
}

/// A bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw secret, for process environments and auth headers only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Every tunable of the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Primary tool-server executable location
    pub server_path: PathBuf,
    /// Locations searched after the primary one, in order
    pub fallback_server_paths: Vec<PathBuf>,
    /// Binary name looked up on `PATH` as a last resort; empty disables it
    pub server_binary_name: String,
    /// Toolsets enabled on the server
    pub toolsets: Vec<String>,
    /// Environment variable the server reads its token from
    pub token_env_var: String,
    /// Token handed to the server and the HTTP fallback
    pub access_token: Option<AccessToken>,
    /// Warm-up after spawning a pooled connection, in milliseconds
    pub warmup_ms: u64,
    /// Warm-up after spawning a fresh per-call process, in milliseconds
    pub fresh_warmup_ms: u64,
    /// Bound on waiting for one response line
    pub response_timeout_secs: u64,
    /// Bound on waiting for a terminated process to exit
    pub shutdown_timeout_secs: u64,
    /// Root directory of the result cache
    pub cache_dir: PathBuf,
    /// Cache freshness window
    pub cache_ttl_secs: u64,
    /// Fresh process per call, or pooled connections
    pub mode: GatewayMode,
    /// Worker slots in the parallel driver's pool
    pub workers: usize,
    /// Bound on one lane of a parallel run
    pub lane_timeout_secs: u64,
    /// Base URL of the GitHub REST API
    pub github_api_url: String,
    /// Per-request timeout of the HTTP fallback
    pub http_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_path: PathBuf::from(DEFAULT_SERVER_PATH),
            fallback_server_paths: vec![PathBuf::from(DEFAULT_FALLBACK_SERVER_PATH)],
            server_binary_name: DEFAULT_SERVER_BINARY.to_string(),
            toolsets: DEFAULT_TOOLSETS.iter().map(|s| s.to_string()).collect(),
            token_env_var: DEFAULT_TOKEN_ENV_VAR.to_string(),
            access_token: None,
            warmup_ms: 500,
            fresh_warmup_ms: 1000,
            response_timeout_secs: 30,
            shutdown_timeout_secs: 5,
            cache_dir: std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME),
            cache_ttl_secs: 300,
            mode: GatewayMode::Pooled,
            workers: 4,
            lane_timeout_secs: 120,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Load defaults, then environment, then YAML.
    ///
    /// `explicit_path` wins over `REPODOC_CONFIG` and the home-directory file.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let mut config = Self::default();
        config.apply_env_vars();

        let yaml_path = explicit_path
            .map(Path::to_path_buf)
            .or_else(Self::find_yaml_config_file);

        if let Some(path) = yaml_path {
            match YamlConfig::load_from_file(&path) {
                Ok(yaml) => {
                    let mut candidate = config.clone();
                    yaml.apply_to_config(&mut candidate);
                    match candidate.validate() {
                        Ok(()) => {
                            config = candidate;
                            tracing::debug!("Applied configuration from {}", path.display());
                        }
                        Err(e) => tracing::warn!(
                            "Ignoring configuration file {}: {}",
                            path.display(),
                            e
                        ),
                    }
                }
                Err(e) => tracing::warn!(
                    "Failed to load configuration file, continuing with environment and defaults: {}",
                    e
                ),
            }
        }

        config
    }

    /// Load defaults and environment only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        let loader = EnvLoader::default();
        let before = self.clone();

        if let Some(path) = loader.load_optional::<PathBuf>("SERVER_PATH") {
            self.server_path = path;
        }
        self.server_binary_name = loader.load_string("SERVER_BINARY", &self.server_binary_name);
        self.toolsets = loader.load_list("TOOLSETS", &self.toolsets);
        self.warmup_ms = loader.load_parsed("WARMUP_MS", self.warmup_ms);
        self.fresh_warmup_ms = loader.load_parsed("FRESH_WARMUP_MS", self.fresh_warmup_ms);
        self.response_timeout_secs =
            loader.load_parsed("RESPONSE_TIMEOUT_SECS", self.response_timeout_secs);
        self.shutdown_timeout_secs =
            loader.load_parsed("SHUTDOWN_TIMEOUT_SECS", self.shutdown_timeout_secs);
        if let Some(dir) = loader.load_optional::<PathBuf>("CACHE_DIR") {
            self.cache_dir = dir;
        }
        self.cache_ttl_secs = loader.load_parsed("CACHE_TTL_SECS", self.cache_ttl_secs);
        self.mode = loader.load_parsed("GATEWAY_MODE", self.mode);
        self.workers = loader.load_parsed("WORKERS", self.workers);
        self.lane_timeout_secs = loader.load_parsed("LANE_TIMEOUT_SECS", self.lane_timeout_secs);
        self.github_api_url = loader.load_string("GITHUB_API_URL", &self.github_api_url);
        self.http_timeout_secs = loader.load_parsed("HTTP_TIMEOUT_SECS", self.http_timeout_secs);

        if let Some(token) = read_env(&self.token_env_var) {
            self.access_token = Some(AccessToken::new(token.trim()));
        }

        if let Err(e) = self.validate() {
            tracing::warn!("Ignoring environment overrides: {}", e);
            *self = before;
        }
    }

    /// Locate the YAML file: `REPODOC_CONFIG`, then `~/.repodoc/config.yaml`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        if let Some(path) = read_env(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        let candidate = dirs::home_dir()?.join(".repodoc").join("config.yaml");
        if candidate.is_file() {
            tracing::debug!("Found configuration file: {}", candidate.display());
            Some(candidate)
        } else {
            None
        }
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("response_timeout_secs", self.response_timeout_secs),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs),
            ("lane_timeout_secs", self.lane_timeout_secs),
            ("http_timeout_secs", self.http_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(field, value, &format!("{field} must be at least 1")));
            }
        }

        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", 0, "workers must be at least 1"));
        }

        if self.toolsets.is_empty() {
            return Err(ConfigError::invalid(
                "toolsets",
                "[]",
                "enable at least one toolset, e.g. repos",
            ));
        }

        if self.token_env_var.trim().is_empty() {
            return Err(ConfigError::invalid(
                "token_env_var",
                &self.token_env_var,
                "token_env_var names the variable the tool server reads its token from",
            ));
        }

        Ok(())
    }

    /// Every location searched for the executable, excluding the `PATH` lookup
    pub fn candidate_server_paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.server_path.clone())
            .chain(self.fallback_server_paths.iter().cloned())
            .collect()
    }

    /// Toolsets as the server's `--toolsets` argument
    pub fn toolsets_arg(&self) -> String {
        self.toolsets.join(",")
    }

    /// Warm-up for a pooled connection
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Warm-up for a per-call process
    pub fn fresh_warmup(&self) -> Duration {
        Duration::from_millis(self.fresh_warmup_ms)
    }

    /// Bound on one response
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Bound on process exit after termination is requested
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Cache freshness window
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Bound on one lane
    pub fn lane_timeout(&self) -> Duration {
        Duration::from_secs(self.lane_timeout_secs)
    }

    /// HTTP fallback request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Example YAML file content
    pub fn example_yaml_config() -> &'static str {
        r#"# ~/.repodoc/config.yaml
server_path: ./github-mcp-server/github-mcp-server
toolsets: [repos, issues, pull_requests, code_security]
mode: pooled
cache_ttl_secs: 300
response_timeout_secs: 30
workers: 4
"#
    }
}

/// Optional overrides read from YAML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    /// Primary executable location
    pub server_path: Option<PathBuf>,
    /// Locations searched after the primary one
    pub fallback_server_paths: Option<Vec<PathBuf>>,
    /// Binary name for the `PATH` lookup
    pub server_binary_name: Option<String>,
    /// Enabled toolsets
    pub toolsets: Option<Vec<String>>,
    /// Token variable name
    pub token_env_var: Option<String>,
    /// Access token
    pub access_token: Option<AccessToken>,
    /// Pooled warm-up in milliseconds
    pub warmup_ms: Option<u64>,
    /// Fresh warm-up in milliseconds
    pub fresh_warmup_ms: Option<u64>,
    /// Response bound in seconds
    pub response_timeout_secs: Option<u64>,
    /// Shutdown bound in seconds
    pub shutdown_timeout_secs: Option<u64>,
    /// Cache root
    pub cache_dir: Option<PathBuf>,
    /// Cache freshness in seconds
    pub cache_ttl_secs: Option<u64>,
    /// Gateway mode
    pub mode: Option<GatewayMode>,
    /// Worker slots
    pub workers: Option<usize>,
    /// Lane bound in seconds
    pub lane_timeout_secs: Option<u64>,
    /// GitHub API base URL
    pub github_api_url: Option<String>,
    /// HTTP timeout in seconds
    pub http_timeout_secs: Option<u64>,
}

macro_rules! apply_fields {
    ($yaml:expr, $config:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$yaml.$field {
                $config.$field = value.clone();
            }
        )+
    };
}

impl YamlConfig {
    /// Parse a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay every value that is present onto `config`
    pub fn apply_to_config(&self, config: &mut GatewayConfig) {
        apply_fields!(
            self,
            config,
            server_path,
            fallback_server_paths,
            server_binary_name,
            toolsets,
            token_env_var,
            warmup_ms,
            fresh_warmup_ms,
            response_timeout_secs,
            shutdown_timeout_secs,
            cache_dir,
            cache_ttl_secs,
            mode,
            workers,
            lane_timeout_secs,
            github_api_url,
            http_timeout_secs,
        );
        if let Some(token) = &self.access_token {
            config.access_token = Some(token.clone());
        }
    }
}
