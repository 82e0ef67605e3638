//! A single tool-server subprocess speaking line-delimited JSON-RPC

use crate::config::{AccessToken, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::protocol::RpcRequest;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

/// Transport mode argument passed to the server
pub const STDIO_TRANSPORT: &str = "stdio";

/// Everything needed to launch a server process
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Comma-separated toolsets
    pub toolsets: String,
    /// Variable the server reads its token from
    pub token_env_var: String,
    /// The token, if any
    pub access_token: Option<AccessToken>,
    /// Sleep after spawning, before the first request
    pub warmup: Duration,
    /// Bound on one response line
    pub response_timeout: Duration,
    /// Bound on exit after termination is requested
    pub shutdown_timeout: Duration,
}

impl LaunchOptions {
    /// Options for a pooled connection
    pub fn pooled(config: &GatewayConfig) -> Self {
        Self::with_warmup(config, config.warmup())
    }

    /// Options for a one-shot process
    pub fn fresh(config: &GatewayConfig) -> Self {
        Self::with_warmup(config, config.fresh_warmup())
    }

    fn with_warmup(config: &GatewayConfig, warmup: Duration) -> Self {
        Self {
            toolsets: config.toolsets_arg(),
            token_env_var: config.token_env_var.clone(),
            access_token: config.access_token.clone(),
            warmup,
            response_timeout: config.response_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// A live session with one spawned tool server.
///
/// Exactly one request is in flight at a time, so responses are matched to
/// requests by order rather than by id.
#[derive(Debug)]
pub struct ServerConnection {
    program: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    response_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ServerConnection {
    /// Launch `<program> --toolsets <list> stdio` and wait out the warm-up
    pub async fn spawn(program: &Path, options: &LaunchOptions) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.arg("--toolsets")
            .arg(&options.toolsets)
            .arg(STDIO_TRANSPORT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(token) = &options.access_token {
            cmd.env(&options.token_env_var, token.expose());
        }

        let mut child = cmd.spawn().map_err(|e| {
            GatewayError::process(format!("failed to spawn {}: {}", program.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::process("tool server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::process("tool server stdout unavailable"))?;

        if let Some(stderr) = child.stderr.take() {
            let pid = child.id().unwrap_or_default();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if !line.trim().is_empty() {
                        tracing::debug!("tool-server[{}] stderr: {}", pid, line);
                    }
                }
            });
        }

        tracing::info!(
            "Started tool server {} (pid {:?})",
            program.display(),
            child.id()
        );

        if !options.warmup.is_zero() {
            tokio::time::sleep(options.warmup).await;
        }

        Ok(Self {
            program: program.to_path_buf(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            response_timeout: options.response_timeout,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    /// OS process id while the process is running
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Executable this connection was started from
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the process has not exited yet
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Allocate the next request id
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Write one request line and read one non-empty response line.
    ///
    /// The read is bounded by the response timeout. After a `Timeout` or a
    /// process failure the connection is unusable and must be terminated.
    pub async fn round_trip(&mut self, request: &RpcRequest) -> Result<String> {
        let line = request.to_line()?;
        tracing::debug!("-> {}", line.trim_end());

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| GatewayError::process("tool server stdin already closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let bound = self.response_timeout;
        let read = timeout(bound, async {
            loop {
                match self.stdout.next_line().await? {
                    Some(line) if line.trim().is_empty() => continue,
                    other => return Ok::<_, std::io::Error>(other),
                }
            }
        })
        .await;

        match read {
            Ok(Ok(Some(response))) => {
                tracing::debug!("<- {}", response);
                Ok(response)
            }
            Ok(Ok(None)) => {
                let status = self
                    .child
                    .try_wait()
                    .ok()
                    .flatten()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "still running".to_string());
                Err(GatewayError::process(format!(
                    "tool server closed its output ({status})"
                )))
            }
            Ok(Err(e)) => Err(GatewayError::Io(e)),
            Err(_) => {
                tracing::warn!("No response from tool server within {:?}", bound);
                Err(GatewayError::Timeout { duration: bound })
            }
        }
    }

    /// Stop the process: close stdin, ask it to terminate, wait for the
    /// shutdown bound, then kill it.
    pub async fn terminate(mut self) -> Result<()> {
        let pid = self.child.id();
        drop(self.stdin.take());

        if matches!(self.child.try_wait(), Ok(Some(_))) {
            tracing::debug!("Tool server {:?} already exited", pid);
            return Ok(());
        }

        request_termination(&mut self.child);

        match timeout(self.shutdown_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("Tool server {:?} stopped ({})", pid, status);
                Ok(())
            }
            Ok(Err(e)) => Err(GatewayError::process(format!(
                "failed waiting for tool server {pid:?}: {e}"
            ))),
            Err(_) => {
                tracing::warn!(
                    "Tool server {:?} ignored termination for {:?}, killing it",
                    pid,
                    self.shutdown_timeout
                );
                self.child.kill().await?;
                Err(GatewayError::process(format!(
                    "tool server {pid:?} did not exit within {:?}",
                    self.shutdown_timeout
                )))
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to {} failed: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to stop tool server: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::FakeToolServer;
    use crate::types::ToolCall;

    fn options() -> LaunchOptions {
        LaunchOptions {
            toolsets: "repos".to_string(),
            token_env_var: "FAKE_TOKEN".to_string(),
            access_token: Some(AccessToken::new("t0ken")),
            warmup: Duration::ZERO,
            response_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_increasing_ids() {
        let server = FakeToolServer::builder()
            .respond(r#"{"jsonrpc":"2.0","id":1,"result":{"text":"ok"}}"#)
            .build();
        let mut conn = ServerConnection::spawn(server.path(), &options()).await.unwrap();

        let call = ToolCall::new("get_me");
        let first_id = conn.next_request_id();
        let line = conn
            .round_trip(&RpcRequest::tools_call(first_id, &call))
            .await
            .unwrap();
        assert!(line.contains("\"ok\""));

        let second_id = conn.next_request_id();
        assert_eq!(second_id, first_id + 1);
        conn.round_trip(&RpcRequest::tools_call(second_id, &call))
            .await
            .unwrap();

        conn.terminate().await.unwrap();

        let requests = server.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("\"method\":\"tools/call\""));
    }

    #[tokio::test]
    async fn test_timeout_when_server_is_silent() {
        let server = FakeToolServer::builder().silent().build();
        let mut opts = options();
        opts.response_timeout = Duration::from_millis(200);
        let mut conn = ServerConnection::spawn(server.path(), &opts).await.unwrap();

        let err = conn
            .round_trip(&RpcRequest::tools_list(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(err.tears_down_connection());
        let _ = conn.terminate().await;
    }

    #[tokio::test]
    async fn test_crash_is_process_failure() {
        let server = FakeToolServer::builder().exit_on_request().build();
        let mut conn = ServerConnection::spawn(server.path(), &options()).await.unwrap();

        let err = conn
            .round_trip(&RpcRequest::tools_list(1))
            .await
            .unwrap_err();
        assert!(err.tears_down_connection());
        let _ = conn.terminate().await;
    }

    #[tokio::test]
    async fn test_token_reaches_server_environment() {
        let server = FakeToolServer::builder()
            .token_env_var("FAKE_TOKEN")
            .respond(r#"{"result":"x"}"#)
            .build();
        let mut conn = ServerConnection::spawn(server.path(), &options()).await.unwrap();
        conn.round_trip(&RpcRequest::tools_list(1)).await.unwrap();
        conn.terminate().await.unwrap();

        let launch = server.recorded_launches();
        assert_eq!(launch.len(), 1);
        assert!(launch[0].contains("--toolsets repos stdio"));
        assert!(launch[0].contains("token=t0ken"));
    }
}
