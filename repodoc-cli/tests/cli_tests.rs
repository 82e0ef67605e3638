//! Smoke tests for the `repodoc` binary

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn repodoc() -> Command {
    let mut cmd = Command::cargo_bin("repodoc").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("REPODOC_CONFIG")
        .env_remove("GITHUB_PERSONAL_ACCESS_TOKEN");
    cmd
}

/// Config file pointing at `server`, with no warm-up and no PATH lookup
fn write_config(dir: &Path, server: &Path) -> PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        "server_path: {}\nfallback_server_paths: []\nserver_binary_name: \"\"\nwarmup_ms: 0\nfresh_warmup_ms: 0\nresponse_timeout_secs: 5\nshutdown_timeout_secs: 2\ncache_dir: {}\n",
        server.display(),
        dir.join("cache").display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_help_lists_commands() -> Result<()> {
    repodoc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("doctor"));
    Ok(())
}

#[test]
fn test_call_without_flags_is_rejected() -> Result<()> {
    repodoc()
        .args(["-q", "call", "list_branches"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid request"));
    Ok(())
}

#[test]
fn test_call_with_missing_server_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(dir.path(), &dir.path().join("nowhere"));

    repodoc()
        .arg("--config")
        .arg(&config)
        .args(["-q", "call", "list_branches", "--owner", "acme"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Tool server unavailable"));
    Ok(())
}

#[test]
fn test_doctor_reports_missing_server() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(dir.path(), &dir.path().join("nowhere"));

    repodoc()
        .arg("--config")
        .arg(&config)
        .args(["-q", "doctor"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Tool server executable"))
        .stdout(predicate::str::contains("Cache directory"));
    Ok(())
}

#[cfg(unix)]
mod with_fake_server {
    use super::*;
    use repodoc::test_utils::FakeToolServer;

    const BRANCHES: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"[{\"name\":\"main\"}]"}]}}"#;

    #[test]
    fn test_call_prints_decoded_json() -> Result<()> {
        let server = FakeToolServer::builder().respond(BRANCHES).build();
        let dir = TempDir::new()?;
        let config = write_config(dir.path(), server.path());

        let output = repodoc()
            .arg("--config")
            .arg(&config)
            .args(["-q", "call", "list_branches", "--owner", "acme", "--perPage", "5"])
            .output()?;

        assert!(
            output.status.success(),
            "stderr = {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let printed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(printed, serde_json::json!([{"name": "main"}]));

        let request = &server.recorded_requests()[0];
        assert!(request.contains(r#""perPage":5"#));
        Ok(())
    }

    #[test]
    fn test_fetch_prints_every_lane() -> Result<()> {
        let server = FakeToolServer::builder().respond(BRANCHES).build();
        let dir = TempDir::new()?;
        let config = write_config(dir.path(), server.path());

        let output = repodoc()
            .arg("--config")
            .arg(&config)
            .args(["-q", "fetch", "acme", "widgets", "--scheduling", "threads"])
            .output()?;

        assert_eq!(output.status.code(), Some(0));
        let printed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        for lane in ["repo_structure", "issues", "pull_requests", "branches"] {
            assert_eq!(printed[lane]["ok"][0][0]["name"], "main", "lane {lane}");
        }
        Ok(())
    }

    #[test]
    fn test_fetch_with_failing_lane_exits_with_warning() -> Result<()> {
        let server = FakeToolServer::builder()
            .exit_on("list_issues")
            .respond(BRANCHES)
            .build();
        let dir = TempDir::new()?;
        let config = write_config(dir.path(), server.path());

        let output = repodoc()
            .arg("--config")
            .arg(&config)
            .args(["-q", "fetch", "acme", "widgets"])
            .output()?;

        assert_eq!(output.status.code(), Some(1));
        let printed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        assert!(printed["issues"]["error"].is_string());
        assert!(printed["branches"]["ok"].is_array());
        Ok(())
    }
}
