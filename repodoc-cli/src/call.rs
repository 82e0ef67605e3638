//! `repodoc call` and `repodoc tools`

use crate::error::{CliError, CliResult};
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use repodoc::encoder::{encode_command, COMMAND_VERB};
use repodoc::{OwnerKey, ToolCall, ToolGateway, ToolResult};
use serde::Serialize;

/// Owner key for connections opened by single commands
pub const CLI_OWNER: &str = "cli";

/// Prefix the implied verb and encode the call
pub fn build_call(tool: &str, args: &[String]) -> CliResult<ToolCall> {
    let mut tokens = Vec::with_capacity(args.len() + 2);
    tokens.push(COMMAND_VERB);
    tokens.push(tool);
    tokens.extend(args.iter().map(String::as_str));

    encode_command(&tokens).map_err(|e| {
        CliError::from_error(
            format!("Cannot build a call to '{tool}' (pass at least one --flag)"),
            e,
            EXIT_ERROR,
        )
    })
}

pub async fn run_call(gateway: &ToolGateway, tool: &str, args: &[String]) -> CliResult<i32> {
    let call = build_call(tool, args)?;
    tracing::info!("Calling {}", call);

    let result = gateway.invoke(&OwnerKey::new(CLI_OWNER), &call).await?;
    if result.is_absent() {
        tracing::warn!("{} returned no data", call.name);
    }
    print_json(&result)?;
    Ok(EXIT_SUCCESS)
}

pub async fn run_tools(gateway: &ToolGateway) -> CliResult<i32> {
    let tools = gateway.list_tools(&OwnerKey::new(CLI_OWNER)).await?;
    print_json(&listed_tools(tools))?;
    Ok(EXIT_SUCCESS)
}

/// The `tools` member of a `tools/list` result, or the whole result when
/// the server answered some other shape
fn listed_tools(result: ToolResult) -> serde_json::Value {
    let value = result.into_value();
    match value.get("tools") {
        Some(tools) => tools.clone(),
        None => value,
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
