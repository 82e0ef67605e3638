//! Alternate backends that honor the same tool-call contract as the server

pub mod github;

pub use github::GitHubApiBackend;

use crate::error::Result;
use crate::types::{ToolCall, ToolResult};
use async_trait::async_trait;

/// Something that can answer a [`ToolCall`] without the tool server
#[async_trait]
pub trait ToolBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Answer `call`; tools the backend does not know yield an absent result
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult>;
}
