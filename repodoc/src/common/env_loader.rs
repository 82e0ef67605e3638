//! Environment variable loading with a shared prefix
//!
//! Every gateway setting can be overridden by a `REPODOC_<NAME>` variable.
//! Values that fail to parse are logged and ignored so a typo in the
//! environment never prevents the gateway from starting.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Prefix for every gateway environment variable
pub const ENV_PREFIX: &str = "REPODOC";

/// Read a variable, treating an empty value as unset
pub fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Loads prefixed environment variables with fallbacks
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

impl EnvLoader {
    /// Create a loader for `<prefix>_<suffix>` variables
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Full variable name for a suffix
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string, keeping `current` when unset
    pub fn load_string(&self, suffix: &str, current: &str) -> String {
        read_env(&self.key(suffix)).unwrap_or_else(|| current.to_string())
    }

    /// Load a parsed value, keeping `current` when unset or unparseable
    pub fn load_parsed<T>(&self, suffix: &str, current: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        let key = self.key(suffix);
        match read_env(&key) {
            Some(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Ignoring {}={:?}: {}", key, raw, e);
                    current
                }
            },
            None => current,
        }
    }

    /// Load a value only if it is set and parses
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        read_env(&self.key(suffix)).and_then(|v| v.trim().parse().ok())
    }

    /// Load a comma-separated list, keeping `current` when unset
    pub fn load_list(&self, suffix: &str, current: &[String]) -> Vec<String> {
        match read_env(&self.key(suffix)) {
            Some(raw) => split_list(&raw),
            None => current.to_vec(),
        }
    }
}

/// Split a comma-separated list, dropping blank entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_string() {
        let loader = EnvLoader::new("REPODOC_TEST");
        env::remove_var("REPODOC_TEST_NAME");
        assert_eq!(loader.load_string("NAME", "fallback"), "fallback");

        env::set_var("REPODOC_TEST_NAME", "from-env");
        assert_eq!(loader.load_string("NAME", "fallback"), "from-env");

        env::set_var("REPODOC_TEST_NAME", "  ");
        assert_eq!(loader.load_string("NAME", "fallback"), "fallback");

        env::remove_var("REPODOC_TEST_NAME");
    }

    #[test]
    #[serial]
    fn test_load_parsed_keeps_current_on_garbage() {
        let loader = EnvLoader::new("REPODOC_TEST");
        env::set_var("REPODOC_TEST_WORKERS", "8");
        assert_eq!(loader.load_parsed::<usize>("WORKERS", 4), 8);

        env::set_var("REPODOC_TEST_WORKERS", "eight");
        assert_eq!(loader.load_parsed::<usize>("WORKERS", 4), 4);

        env::remove_var("REPODOC_TEST_WORKERS");
        assert_eq!(loader.load_optional::<usize>("WORKERS"), None);
    }

    #[test]
    #[serial]
    fn test_load_list() {
        let loader = EnvLoader::new("REPODOC_TEST");
        let current = vec!["repos".to_string()];

        env::remove_var("REPODOC_TEST_TOOLSETS");
        assert_eq!(loader.load_list("TOOLSETS", &current), current);

        env::set_var("REPODOC_TEST_TOOLSETS", "repos, issues,,pull_requests ");
        assert_eq!(
            loader.load_list("TOOLSETS", &current),
            vec!["repos", "issues", "pull_requests"]
        );

        env::remove_var("REPODOC_TEST_TOOLSETS");
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(EnvLoader::default().key("CACHE_DIR"), "REPODOC_CACHE_DIR");
    }
}
