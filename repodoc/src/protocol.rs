//! JSON-RPC 2.0 wire types for the tool server's stdio transport
//!
//! One request per line on the server's stdin, one response per line on its
//! stdout.

use crate::types::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol version sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Invoke a named tool
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Enumerate available tools
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// A JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version (always "2.0")
    pub jsonrpc: String,
    /// Request identifier
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Value,
}

impl RpcRequest {
    /// Build a request for any method
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    /// `tools/call` with `{name, arguments}` params
    pub fn tools_call(id: u64, call: &ToolCall) -> Self {
        Self::new(
            id,
            METHOD_TOOLS_CALL,
            json!({
                "name": call.name,
                "arguments": call.arguments_json(),
            }),
        )
    }

    /// `tools/list` with empty params
    pub fn tools_list(id: u64) -> Self {
        Self::new(id, METHOD_TOOLS_LIST, json!({}))
    }

    /// Serialize as a single newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    /// Error code
    #[serde(default)]
    pub code: i64,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Optional extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Read an error member leniently.
    ///
    /// Servers do not always follow the error object shape, so a bare string
    /// becomes the message and any other shape is rendered as text.
    pub fn from_value(value: &Value) -> Self {
        if let Ok(parsed) = serde_json::from_value::<RpcErrorObject>(value.clone()) {
            if !parsed.message.is_empty() {
                return parsed;
            }
        }
        let message = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            code: value.get("code").and_then(Value::as_i64).unwrap_or(0),
            message,
            data: None,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    /// Parse error: invalid JSON
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Name of a standard code; `None` for server-defined codes
    pub fn name(code: i64) -> Option<&'static str> {
        match code {
            PARSE_ERROR => Some("parse error"),
            INVALID_REQUEST => Some("invalid request"),
            METHOD_NOT_FOUND => Some("method not found"),
            INVALID_PARAMS => Some("invalid params"),
            INTERNAL_ERROR => Some("internal error"),
            _ => None,
        }
    }
}
