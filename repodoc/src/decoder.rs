//! Response decoder: one raw line from the tool server to a [`ToolResult`]
//!
//! The server nests the useful payload at different depths depending on the
//! tool, so extraction is an ordered list of strategies over the `result`
//! member. The first strategy that yields a payload wins.

use crate::error::{GatewayError, Result};
use crate::protocol::{error_codes, RpcErrorObject};
use crate::types::ToolResult;
use serde_json::{Map, Value};

/// A pure function from the `result` member to an optional payload
pub type ExtractionStrategy = fn(&Value) -> Option<ToolResult>;

/// Extraction strategies in the order they are tried
pub const EXTRACTION_STRATEGIES: &[(&str, ExtractionStrategy)] = &[
    ("content_text", extract_content_text),
    ("result_text", extract_result_text),
    ("result", extract_verbatim),
];

/// `result.content[0].text`, re-parsed as JSON when possible.
///
/// A first content item without `text` yields nothing here, so the later
/// strategies apply instead of returning that item as it stands.
pub fn extract_content_text(result: &Value) -> Option<ToolResult> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(reparse_or_text)
}

/// `result.text`, re-parsed as JSON when possible
pub fn extract_result_text(result: &Value) -> Option<ToolResult> {
    result.get("text")?.as_str().map(reparse_or_text)
}

/// `result` itself
pub fn extract_verbatim(result: &Value) -> Option<ToolResult> {
    Some(ToolResult::from_value(result.clone()))
}

fn reparse_or_text(text: &str) -> ToolResult {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ToolResult::from_value(value),
        Err(_) => ToolResult::text(text),
    }
}

/// Run the strategies over a `result` member
pub fn extract_payload(result: &Value) -> ToolResult {
    for (name, strategy) in EXTRACTION_STRATEGIES {
        if let Some(payload) = strategy(result) {
            tracing::trace!("Payload extracted via '{}'", name);
            return payload;
        }
    }
    ToolResult::from_value(result.clone())
}

fn decode_envelope(envelope: &Map<String, Value>) -> Result<ToolResult> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let error = RpcErrorObject::from_value(error);
        tracing::error!(
            "Tool server returned error {} ({}): {}",
            error.code,
            error_codes::name(error.code).unwrap_or("server-defined"),
            error.message
        );
        return Err(GatewayError::ToolError {
            code: error.code,
            message: error.message,
        });
    }

    match envelope.get("result") {
        Some(result) => Ok(extract_payload(result)),
        None => {
            tracing::debug!("Envelope has neither result nor error, returning it whole");
            Ok(ToolResult::from_value(Value::Object(envelope.clone())))
        }
    }
}

/// Strict decode: an unparseable line is a [`GatewayError::DecodeFailure`].
pub fn try_decode(line: &str) -> Result<ToolResult> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ToolResult::none());
    }

    let parsed: Value = serde_json::from_str(trimmed)
        .map_err(|e| GatewayError::DecodeFailure(format!("{e}: {}", preview(trimmed))))?;

    match parsed {
        Value::Object(envelope) => decode_envelope(&envelope),
        other => Ok(ToolResult::from_value(other)),
    }
}

/// Decode a response line, degrading an unparseable line to its trimmed text.
///
/// Only a server error envelope is reported as an error.
pub fn decode_response(line: &str) -> Result<ToolResult> {
    match try_decode(line) {
        Err(GatewayError::DecodeFailure(reason)) => {
            tracing::warn!("Returning raw text for undecodable response ({})", reason);
            Ok(ToolResult::text(line.trim()))
        }
        other => other,
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
