//! The tool gateway: one entry point for every tool call
//!
//! A call moves through encode, cache lookup, send, await, decode and cache
//! store. [`GatewayMode`] picks how the server is reached:
//!
//! - [`GatewayMode::FreshProcess`] starts a process per call and skips the
//!   cache. A missing executable hands the call to the fallback backend.
//! - [`GatewayMode::Pooled`] consults the cache and reuses one connection per
//!   owner. A missing executable is reported as
//!   [`crate::GatewayError::ConnectionUnavailable`]; there is no fallback.
//!
//! A timeout or process failure discards the connection involved so the next
//! call starts clean.

use crate::cache::ResponseCache;
use crate::config::{GatewayConfig, GatewayMode};
use crate::connection::{ConnectionPool, LaunchOptions, ServerConnection, ServerLocator};
use crate::decoder::decode_response;
use crate::encoder::encode_command;
use crate::error::{ErrorKind, Result};
use crate::fallback::{GitHubApiBackend, ToolBackend};
use crate::protocol::RpcRequest;
use crate::stats::{GatewayStats, StatsSnapshot};
use crate::types::{OwnerKey, ToolCall, ToolResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can run a tool call on behalf of an owner
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run `call` under `owner`'s connection
    async fn invoke(&self, owner: &OwnerKey, call: &ToolCall) -> Result<ToolResult>;
}

/// Runs tool calls against the tool server
#[derive(Debug)]
pub struct ToolGateway {
    config: GatewayConfig,
    locator: ServerLocator,
    pool: ConnectionPool,
    cache: ResponseCache,
    fallback: Option<Arc<dyn ToolBackend>>,
    stats: Arc<GatewayStats>,
}

impl ToolGateway {
    /// Build a gateway from configuration.
    ///
    /// The GitHub API backend is attached as the fallback when its HTTP
    /// client can be built.
    pub fn new(config: GatewayConfig) -> Self {
        let fallback = match GitHubApiBackend::from_config(&config) {
            Ok(backend) => Some(Arc::new(backend) as Arc<dyn ToolBackend>),
            Err(e) => {
                tracing::warn!("GitHub API fallback disabled: {}", e);
                None
            }
        };
        Self::with_backend(config, fallback)
    }

    /// Build a gateway with an explicit fallback backend, or none
    pub fn with_backend(config: GatewayConfig, fallback: Option<Arc<dyn ToolBackend>>) -> Self {
        let stats = Arc::new(GatewayStats::default());
        let locator = ServerLocator::from_config(&config);
        let pool = ConnectionPool::new(
            locator.clone(),
            LaunchOptions::pooled(&config),
            Arc::clone(&stats),
        );
        let cache = ResponseCache::new(config.cache_dir.clone(), config.cache_ttl());

        Self {
            config,
            locator,
            pool,
            cache,
            fallback,
            stats,
        }
    }

    /// Active mode
    pub fn mode(&self) -> GatewayMode {
        self.config.mode
    }

    /// Settings this gateway was built with
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The result cache (only consulted in pooled mode)
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The connection pool (only used in pooled mode)
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Counters since construction
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one tool call, reporting every failure to the caller
    pub async fn invoke(&self, owner: &OwnerKey, call: &ToolCall) -> Result<ToolResult> {
        self.stats.record_call();
        match self.config.mode {
            GatewayMode::FreshProcess => self.invoke_fresh(call).await,
            GatewayMode::Pooled => self.invoke_pooled(owner, call).await,
        }
    }

    /// Encode `tools <name> --flag value ...` and run it.
    ///
    /// Failures confined to this one call (bad command, server error,
    /// timeout, crashed process) are logged and returned as an absent
    /// result. A missing executable in pooled mode is still an error.
    pub async fn execute<S: AsRef<str>>(&self, owner: &OwnerKey, tokens: &[S]) -> Result<ToolResult> {
        let call = match encode_command(tokens) {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!("Nothing to do: {}", e);
                return Ok(ToolResult::none());
            }
        };

        match self.invoke(owner, &call).await {
            Ok(result) => Ok(result),
            Err(e) if e.kind() == ErrorKind::ConnectionUnavailable => Err(e),
            Err(e) => {
                tracing::warn!("{} returned no data: {}", call.name, e);
                Ok(ToolResult::none())
            }
        }
    }

    /// Ask the server which tools it offers. Never cached.
    pub async fn list_tools(&self, owner: &OwnerKey) -> Result<ToolResult> {
        let line = match self.config.mode {
            GatewayMode::Pooled => {
                let mut lease = self.pool.acquire(owner).await?;
                lease.round_trip(RpcRequest::tools_list).await?
            }
            GatewayMode::FreshProcess => {
                self.fresh_round_trip(&RpcRequest::tools_list(1)).await?
            }
        };
        decode_response(&line)
    }

    /// Stop `owner`'s pooled connection
    pub async fn release(&self, owner: &OwnerKey) -> Result<()> {
        self.pool.release(owner).await
    }

    /// Stop every pooled connection
    pub async fn shutdown(&self) -> usize {
        self.pool.shutdown_all().await
    }

    async fn invoke_pooled(&self, owner: &OwnerKey, call: &ToolCall) -> Result<ToolResult> {
        if let Some(hit) = self.cache.lookup(call) {
            self.stats.record_cache_hit();
            return Ok(hit);
        }
        self.stats.record_cache_miss();

        let line = {
            let mut lease = self.pool.acquire(owner).await?;
            lease
                .round_trip(|id| RpcRequest::tools_call(id, call))
                .await?
        };

        let result = decode_response(&line)?;
        self.cache.store(call, &result);
        Ok(result)
    }

    async fn invoke_fresh(&self, call: &ToolCall) -> Result<ToolResult> {
        match self.fresh_round_trip(&RpcRequest::tools_call(1, call)).await {
            Ok(line) => decode_response(&line),
            Err(e) if e.kind() == ErrorKind::ConnectionUnavailable => match &self.fallback {
                Some(backend) => {
                    tracing::warn!("{}; answering {} via {}", e, call.name, backend.name());
                    self.stats.record_fallback();
                    backend.invoke(call).await
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn fresh_round_trip(&self, request: &RpcRequest) -> Result<String> {
        let program = self.locator.locate()?;
        let mut conn =
            ServerConnection::spawn(&program, &LaunchOptions::fresh(&self.config)).await?;
        self.stats.record_spawn();

        let result = conn.round_trip(request).await;
        if let Err(e) = &result {
            if e.tears_down_connection() {
                self.stats.record_teardown();
            }
        }
        if let Err(e) = conn.terminate().await {
            tracing::debug!("Per-call tool server did not stop cleanly: {}", e);
        }
        result
    }
}

#[async_trait]
impl ToolInvoker for ToolGateway {
    async fn invoke(&self, owner: &OwnerKey, call: &ToolCall) -> Result<ToolResult> {
        ToolGateway::invoke(self, owner, call).await
    }
}
