//! Test utilities for RepoDoc tests
//!
//! Provides a scriptable stand-in for the tool server so gateway, pool and
//! driver tests can run without a real `github-mcp-server` binary.
//!
//! The fake server is a generated POSIX shell script living in a temporary
//! directory. It reads one JSON-RPC request per line from stdin, records it,
//! and reacts according to the first matching rule: answer with a canned
//! line, answer after a delay, stay silent, or exit. Every launch is
//! recorded with its arguments and the token it received.
//!
//! ```no_run
//! use repodoc::test_utils::FakeToolServer;
//!
//! let server = FakeToolServer::builder()
//!     .respond(r#"{"result":{"content":[{"text":"[]"}]}}"#)
//!     .build();
//! assert_eq!(server.launch_count(), 0);
//! ```

use crate::config::GatewayConfig;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Token variable the fake server reports by default
pub const DEFAULT_FAKE_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

#[derive(Debug, Clone)]
enum Behavior {
    Respond(String),
    Delayed(Duration, String),
    Silent,
    Exit(i32),
}

/// Builder for a [`FakeToolServer`]
#[derive(Debug, Clone)]
pub struct FakeToolServerBuilder {
    rules: Vec<(String, Behavior)>,
    default: Behavior,
    token_env_var: String,
}

impl FakeToolServerBuilder {
    /// Answer every unmatched request with `line`
    pub fn respond(mut self, line: &str) -> Self {
        self.default = Behavior::Respond(line.to_string());
        self
    }

    /// Answer every unmatched request with `line` after `delay`
    pub fn respond_after(mut self, delay: Duration, line: &str) -> Self {
        self.default = Behavior::Delayed(delay, line.to_string());
        self
    }

    /// Never answer unmatched requests
    pub fn silent(mut self) -> Self {
        self.default = Behavior::Silent;
        self
    }

    /// Exit with status 3 on the first unmatched request
    pub fn exit_on_request(mut self) -> Self {
        self.default = Behavior::Exit(3);
        self
    }

    /// Answer requests for `tool` with `line`
    pub fn respond_to(mut self, tool: &str, line: &str) -> Self {
        self.rules
            .push((tool_pattern(tool), Behavior::Respond(line.to_string())));
        self
    }

    /// Answer requests for `tool` with `line` after `delay`
    pub fn respond_to_after(mut self, tool: &str, delay: Duration, line: &str) -> Self {
        self.rules.push((
            tool_pattern(tool),
            Behavior::Delayed(delay, line.to_string()),
        ));
        self
    }

    /// Never answer requests for `tool`
    pub fn silent_on(mut self, tool: &str) -> Self {
        self.rules.push((tool_pattern(tool), Behavior::Silent));
        self
    }

    /// Exit when a request for `tool` arrives
    pub fn exit_on(mut self, tool: &str) -> Self {
        self.rules.push((tool_pattern(tool), Behavior::Exit(3)));
        self
    }

    /// Variable whose value is recorded with every launch
    pub fn token_env_var(mut self, name: &str) -> Self {
        self.token_env_var = name.to_string();
        self
    }

    /// Write the script and make it executable.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory or script cannot be created.
    pub fn build(self) -> FakeToolServer {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("create fake server directory");
        let root = dir.path();
        let mut script = String::from("#!/bin/sh\n");
        let _ = writeln!(
            script,
            "printf '%s token=%s\\n' \"$*\" \"${{{}}}\" >> '{}'",
            self.token_env_var,
            root.join(LAUNCHES_LOG).display()
        );
        script.push_str("while IFS= read -r line; do\n");
        let _ = writeln!(
            script,
            "  printf '%s\\n' \"$line\" >> '{}'",
            root.join(REQUESTS_LOG).display()
        );
        script.push_str("  case \"$line\" in\n");

        let mut payloads = 0usize;
        let mut action = |behavior: &Behavior| -> String {
            match behavior {
                Behavior::Respond(line) => {
                    let path = write_payload(root, &mut payloads, line);
                    format!("cat '{}'", path.display())
                }
                Behavior::Delayed(delay, line) => {
                    let path = write_payload(root, &mut payloads, line);
                    format!("sleep {:.3}; cat '{}'", delay.as_secs_f64(), path.display())
                }
                Behavior::Silent => ":".to_string(),
                Behavior::Exit(code) => format!("exit {code}"),
            }
        };

        for (pattern, behavior) in &self.rules {
            let _ = writeln!(script, "    *'{}'*) {} ;;", pattern, action(behavior));
        }
        let _ = writeln!(script, "    *) {} ;;", action(&self.default));
        script.push_str("  esac\ndone\n");

        let path = root.join("fake-tool-server");
        std::fs::write(&path, script).expect("write fake server script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("make fake server executable");

        FakeToolServer { dir, path }
    }
}

const LAUNCHES_LOG: &str = "launches.log";
const REQUESTS_LOG: &str = "requests.log";

fn tool_pattern(tool: &str) -> String {
    format!("\"name\":\"{tool}\"")
}

fn write_payload(root: &Path, counter: &mut usize, line: &str) -> PathBuf {
    *counter += 1;
    let path = root.join(format!("payload-{counter}.json"));
    std::fs::write(&path, format!("{}\n", line.trim_end())).expect("write fake server payload");
    path
}

/// A fake tool server on disk, removed when dropped
#[derive(Debug)]
pub struct FakeToolServer {
    dir: TempDir,
    path: PathBuf,
}

impl FakeToolServer {
    /// Start building a server; by default it answers `{"result":null}`
    pub fn builder() -> FakeToolServerBuilder {
        FakeToolServerBuilder {
            rules: Vec::new(),
            default: Behavior::Respond(r#"{"jsonrpc":"2.0","id":1,"result":null}"#.to_string()),
            token_env_var: DEFAULT_FAKE_TOKEN_VAR.to_string(),
        }
    }

    /// Executable path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the script and its logs
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// One line per launch: arguments, then `token=<value>`
    pub fn recorded_launches(&self) -> Vec<String> {
        read_lines(&self.dir.path().join(LAUNCHES_LOG))
    }

    /// Number of times the script was started
    pub fn launch_count(&self) -> usize {
        self.recorded_launches().len()
    }

    /// Every request line received, across all launches
    pub fn recorded_requests(&self) -> Vec<String> {
        read_lines(&self.dir.path().join(REQUESTS_LOG))
    }

    /// Gateway configuration pointing at this server, with no warm-up, short
    /// timeouts, no `PATH` lookup and a cache under `cache_dir`
    pub fn config(&self, cache_dir: &Path) -> GatewayConfig {
        GatewayConfig {
            server_path: self.path.clone(),
            fallback_server_paths: Vec::new(),
            server_binary_name: String::new(),
            warmup_ms: 0,
            fresh_warmup_ms: 0,
            response_timeout_secs: 5,
            shutdown_timeout_secs: 2,
            cache_dir: cache_dir.to_path_buf(),
            ..GatewayConfig::default()
        }
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Configuration whose executable cannot be found anywhere
pub fn missing_server_config(cache_dir: &Path) -> GatewayConfig {
    GatewayConfig {
        server_path: cache_dir.join("missing").join("github-mcp-server"),
        fallback_server_paths: vec![cache_dir.join("also-missing")],
        server_binary_name: String::new(),
        warmup_ms: 0,
        fresh_warmup_ms: 0,
        cache_dir: cache_dir.to_path_buf(),
        ..GatewayConfig::default()
    }
}
