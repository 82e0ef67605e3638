//! # RepoDoc
//!
//! A tool-invocation gateway for a GitHub tool server that speaks
//! line-delimited JSON-RPC 2.0 over stdio.
//!
//! ## Features
//!
//! - **Request Encoding**: Turn `tools <name> --flag value` tokens into typed calls
//! - **Response Decoding**: Unwrap the payload from inconsistently nested envelopes
//! - **Caching**: Content-addressed, time-bounded result cache on disk
//! - **Connection Pooling**: One long-lived server process per owner
//! - **Fallback**: Direct GitHub REST API when the server binary is missing
//! - **Parallel Lanes**: Fetch independent categories concurrently, isolating failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use repodoc::{GatewayConfig, OwnerKey, ToolCall, ToolGateway};
//!
//! # async fn example() -> repodoc::Result<()> {
//! let gateway = ToolGateway::new(GatewayConfig::load(None));
//! let call = ToolCall::new("list_branches")
//!     .with_arg("owner", "acme")
//!     .with_arg("repo", "widgets")
//!     .with_arg("perPage", 5i64);
//!
//! let branches = gateway.invoke(&OwnerKey::new("main"), &call).await?;
//! println!("{}", branches.as_value());
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Shared helpers
pub mod common;

/// Gateway configuration
pub mod config;

/// Error types
pub mod error;

/// Core value types
pub mod types;

/// Command tokens to tool calls
pub mod encoder;

/// Response lines to tool results
pub mod decoder;

/// JSON-RPC wire types
pub mod protocol;

/// File-backed result cache
pub mod cache;

/// Tool-server processes and the connection pool
pub mod connection;

/// Gateway counters
pub mod stats;

/// The gateway itself
pub mod gateway;

/// Backends that stand in for the tool server
pub mod fallback;

/// Concurrent lanes of tool calls
pub mod parallel;

pub use config::{AccessToken, ConfigError, GatewayConfig, GatewayMode};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{ToolGateway, ToolInvoker};
pub use parallel::{repository_lanes, Lane, LaneOutcome, LaneRunner, ParallelRun, Scheduling};
pub use stats::StatsSnapshot;
pub use types::{ArgValue, OwnerKey, ToolCall, ToolResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ArgValue, ErrorKind, GatewayConfig, GatewayError, GatewayMode, Lane, LaneOutcome,
        LaneRunner, OwnerKey, Result, Scheduling, ToolCall, ToolGateway, ToolInvoker, ToolResult,
    };
}

/// Test utilities module for testing support
#[doc(hidden)]
#[cfg(unix)]
pub mod test_utils;
