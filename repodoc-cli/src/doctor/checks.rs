//! Check implementations for the doctor module

use super::types::*;
use anyhow::Result;
use repodoc::config::YamlConfig;
use repodoc::connection::ServerLocator;
use repodoc::{GatewayConfig, GatewayError, GatewayMode};
use std::fs;
use std::path::Path;

/// Check names constants to avoid typos and improve maintainability
pub mod check_names {
    pub const SERVER_EXECUTABLE: &str = "Tool server executable";
    pub const ACCESS_TOKEN: &str = "GitHub access token";
    pub const CONFIG_FILE: &str = "Configuration file";
    pub const CONFIG_VALUES: &str = "Configuration values";
    pub const CACHE_DIR: &str = "Cache directory";
}

/// Check that the tool-server executable can be found.
///
/// A missing executable is an error in pooled mode and a warning in fresh
/// mode, where calls fall back to the GitHub REST API.
pub fn check_server_executable(config: &GatewayConfig, checks: &mut Vec<Check>) -> Result<()> {
    let locator = ServerLocator::from_config(config);
    let check = match locator.locate() {
        Ok(path) => Check::new(check_names::SERVER_EXECUTABLE, CheckCategory::ToolServer, CheckStatus::Ok)
            .with_message(format!("Found at: {}", path.display())),
        Err(GatewayError::ConnectionUnavailable { searched }) => {
            let status = match config.mode {
                GatewayMode::Pooled => CheckStatus::Error,
                GatewayMode::FreshProcess => CheckStatus::Warning,
            };
            let searched: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
            Check::new(check_names::SERVER_EXECUTABLE, CheckCategory::ToolServer, status)
                .with_message(format!("Not found (searched: {})", searched.join(", ")))
                .with_fix("Build github-mcp-server or point REPODOC_SERVER_PATH at it")
        }
        Err(e) => Check::new(check_names::SERVER_EXECUTABLE, CheckCategory::ToolServer, CheckStatus::Error)
            .with_message(e.to_string()),
    };
    checks.push(check.build());
    Ok(())
}

/// Check that a token will be handed to the tool server
pub fn check_access_token(config: &GatewayConfig, checks: &mut Vec<Check>) -> Result<()> {
    let check = match &config.access_token {
        Some(token) if !token.expose().is_empty() => {
            Check::new(check_names::ACCESS_TOKEN, CheckCategory::Configuration, CheckStatus::Ok)
                .with_message(format!("Set (passed as {})", config.token_env_var))
        }
        _ => Check::new(check_names::ACCESS_TOKEN, CheckCategory::Configuration, CheckStatus::Warning)
            .with_message("No token configured; GitHub rate limits will be low")
            .with_fix(format!("export {}=<token>", config.token_env_var)),
    };
    checks.push(check.build());
    Ok(())
}

/// Check that the YAML file, if any, parses
pub fn check_config_file(explicit: Option<&Path>, checks: &mut Vec<Check>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(GatewayConfig::find_yaml_config_file);

    let check = match path {
        None => Check::new(check_names::CONFIG_FILE, CheckCategory::Configuration, CheckStatus::Ok)
            .with_message("None found, using defaults and environment"),
        Some(path) => match YamlConfig::load_from_file(&path) {
            Ok(_) => Check::new(check_names::CONFIG_FILE, CheckCategory::Configuration, CheckStatus::Ok)
                .with_message(format!("Loaded {}", path.display())),
            Err(e) => Check::new(check_names::CONFIG_FILE, CheckCategory::Configuration, CheckStatus::Warning)
                .with_message(e.to_string())
                .with_fix(format!(
                    "Fix or remove {}; example:\n{}",
                    path.display(),
                    GatewayConfig::example_yaml_config()
                )),
        },
    };
    checks.push(check.build());
    Ok(())
}

/// Check that the effective settings are usable
pub fn check_config_values(config: &GatewayConfig, checks: &mut Vec<Check>) -> Result<()> {
    let check = match config.validate() {
        Ok(()) => Check::new(check_names::CONFIG_VALUES, CheckCategory::Configuration, CheckStatus::Ok)
            .with_message(format!(
                "mode {}, {} worker(s), cache ttl {}s",
                config.mode, config.workers, config.cache_ttl_secs
            )),
        Err(e) => Check::new(check_names::CONFIG_VALUES, CheckCategory::Configuration, CheckStatus::Error)
            .with_message(e.to_string()),
    };
    checks.push(check.build());
    Ok(())
}

/// Check that cache entries can be written
pub fn check_cache_directory(config: &GatewayConfig, checks: &mut Vec<Check>) -> Result<()> {
    let dir = &config.cache_dir;
    let test_file = dir.join(".doctor_test");

    let written = fs::create_dir_all(dir).and_then(|_| fs::write(&test_file, "test"));
    let check = match written {
        Ok(()) => {
            // Best effort; the write already proved access
            let _ = fs::remove_file(&test_file);
            Check::new(check_names::CACHE_DIR, CheckCategory::Storage, CheckStatus::Ok)
                .with_message(format!("{} is writable", dir.display()))
        }
        Err(e) => Check::new(check_names::CACHE_DIR, CheckCategory::Storage, CheckStatus::Error)
            .with_message(format!("{} is not writable: {}", dir.display(), e))
            .with_fix("Set REPODOC_CACHE_DIR to a writable directory"),
    };
    checks.push(check.build());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodoc::AccessToken;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> GatewayConfig {
        GatewayConfig {
            server_path: dir.join("missing-server"),
            fallback_server_paths: Vec::new(),
            server_binary_name: String::new(),
            cache_dir: dir.join("cache"),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_missing_executable_severity_follows_mode() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        let mut checks = Vec::new();

        check_server_executable(&config, &mut checks).unwrap();
        config.mode = GatewayMode::FreshProcess;
        check_server_executable(&config, &mut checks).unwrap();

        assert_eq!(checks[0].status, CheckStatus::Error);
        assert!(checks[0].message.contains("missing-server"));
        assert!(checks[0].fix.is_some());
        assert_eq!(checks[1].status, CheckStatus::Warning);
    }

    #[test]
    fn test_present_executable_is_ok() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        let server = dir.path().join("github-mcp-server");
        fs::write(&server, "").unwrap();
        config.server_path = server;

        let mut checks = Vec::new();
        check_server_executable(&config, &mut checks).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Ok);
    }

    #[test]
    fn test_token_presence() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.access_token = None;
        let mut checks = Vec::new();

        check_access_token(&config, &mut checks).unwrap();
        config.access_token = Some(AccessToken::new("ghp_secret"));
        check_access_token(&config, &mut checks).unwrap();

        assert_eq!(checks[0].status, CheckStatus::Warning);
        assert_eq!(checks[1].status, CheckStatus::Ok);
        assert!(!checks[1].message.contains("ghp_secret"));
    }

    #[test]
    fn test_cache_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let mut checks = Vec::new();

        check_cache_directory(&config, &mut checks).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Ok);
        assert!(config.cache_dir.is_dir());
        assert!(!config.cache_dir.join(".doctor_test").exists());
    }

    #[test]
    fn test_broken_config_file_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "no_such_setting: 1\n").unwrap();
        let mut checks = Vec::new();

        check_config_file(Some(&path), &mut checks).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Warning);

        let good = dir.path().join("good.yaml");
        fs::write(&good, "workers: 2\n").unwrap();
        check_config_file(Some(&good), &mut checks).unwrap();
        assert_eq!(checks[1].status, CheckStatus::Ok);

        let missing = PathBuf::from("/nonexistent/repodoc.yaml");
        check_config_file(Some(&missing), &mut checks).unwrap();
        assert_eq!(checks[2].status, CheckStatus::Warning);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.workers = 0;
        let mut checks = Vec::new();

        check_config_values(&config, &mut checks).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Error);
    }
}
