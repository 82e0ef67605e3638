//! Request encoder: flat command tokens to a typed [`ToolCall`]
//!
//! A command looks like `tools <tool-name> --flag value --switch ...`. Each
//! flag consumes the following token as its value unless that token is itself
//! a flag (or there is none), in which case the flag is a boolean `true`.
//! Values are classified into the narrowest primitive type by
//! [`classify_token`].

use crate::error::{GatewayError, Result};
use crate::types::{ArgValue, ToolCall};
use std::collections::BTreeMap;

/// First token of every command
pub const COMMAND_VERB: &str = "tools";

/// Prefix that marks a token as a flag
pub const FLAG_PREFIX: &str = "--";

/// Verb, tool name and at least one argument token
pub const MIN_COMMAND_TOKENS: usize = 3;

/// Classify a single value token.
///
/// Order matters: exact `true`/`false`, then all ASCII digits (integer),
/// then digits-dot-digits (float), else the token stays a string. An
/// all-digit token too large for `i64`, or a decimal too large for a finite
/// `f64`, stays a string.
pub fn classify_token(token: &str) -> ArgValue {
    match token {
        "true" => return ArgValue::Bool(true),
        "false" => return ArgValue::Bool(false),
        _ => {}
    }

    if is_ascii_digits(token) {
        return match token.parse::<i64>() {
            Ok(n) => ArgValue::Int(n),
            Err(_) => ArgValue::String(token.to_string()),
        };
    }

    if is_decimal(token) {
        match token.parse::<f64>() {
            Ok(x) if x.is_finite() => return ArgValue::Float(x),
            _ => {}
        }
    }

    ArgValue::String(token.to_string())
}

fn is_ascii_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(token: &str) -> bool {
    match token.split_once('.') {
        Some((whole, fraction)) => is_ascii_digits(whole) && is_ascii_digits(fraction),
        None => false,
    }
}

fn is_flag(token: &str) -> bool {
    token.starts_with(FLAG_PREFIX)
}

/// Parse flag/value pairs out of a token list.
///
/// Tokens that are neither a flag nor a flag's value are skipped. A later
/// occurrence of a flag replaces an earlier one. A bare `--` has no name and
/// is ignored together with its value.
pub fn parse_flags<S: AsRef<str>>(tokens: &[S]) -> BTreeMap<String, ArgValue> {
    let mut arguments = BTreeMap::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_ref();
        if !is_flag(token) {
            tracing::trace!("Skipping stray token '{}'", token);
            i += 1;
            continue;
        }

        let name = &token[FLAG_PREFIX.len()..];
        let value = match tokens.get(i + 1).map(AsRef::as_ref) {
            Some(next) if !is_flag(next) => {
                i += 2;
                classify_token(next)
            }
            _ => {
                i += 1;
                ArgValue::Bool(true)
            }
        };

        if name.is_empty() {
            continue;
        }
        arguments.insert(name.to_string(), value);
    }

    arguments
}

/// Encode a full command (`tools <name> --flag value ...`) into a tool call.
///
/// Fails with [`GatewayError::InvalidRequest`] when the command is shorter
/// than [`MIN_COMMAND_TOKENS`] or does not start with [`COMMAND_VERB`].
pub fn encode_command<S: AsRef<str>>(tokens: &[S]) -> Result<ToolCall> {
    if tokens.len() < MIN_COMMAND_TOKENS {
        return Err(GatewayError::InvalidRequest(format!(
            "expected at least {} tokens, got {}",
            MIN_COMMAND_TOKENS,
            tokens.len()
        )));
    }

    let verb = tokens[0].as_ref();
    if verb != COMMAND_VERB {
        return Err(GatewayError::InvalidRequest(format!(
            "expected command verb '{COMMAND_VERB}', got '{verb}'"
        )));
    }

    let name = tokens[1].as_ref();
    if name.is_empty() || is_flag(name) {
        return Err(GatewayError::InvalidRequest(format!(
            "expected a tool name after '{COMMAND_VERB}', got '{name}'"
        )));
    }

    Ok(ToolCall {
        name: name.to_string(),
        arguments: parse_flags(&tokens[2..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_classification_order() {
        assert_eq!(classify_token("true"), ArgValue::Bool(true));
        assert_eq!(classify_token("false"), ArgValue::Bool(false));
        assert_eq!(classify_token("42"), ArgValue::Int(42));
        assert_eq!(classify_token("01"), ArgValue::Int(1));
        assert_eq!(classify_token("2.75"), ArgValue::Float(2.75));
        assert_eq!(classify_token("1.2.3"), ArgValue::String("1.2.3".into()));
        assert_eq!(classify_token(".5"), ArgValue::String(".5".into()));
        assert_eq!(classify_token("5."), ArgValue::String("5.".into()));
        assert_eq!(classify_token("-5"), ArgValue::String("-5".into()));
        assert_eq!(classify_token("True"), ArgValue::String("True".into()));
        assert_eq!(classify_token(""), ArgValue::String(String::new()));
    }

    #[test]
    fn test_integer_overflow_stays_string() {
        let huge = "99999999999999999999999";
        assert_eq!(classify_token(huge), ArgValue::String(huge.into()));
    }

    #[test]
    fn test_encode_list_branches() {
        let call = encode_command(&[
            "tools",
            "list_branches",
            "--owner",
            "acme",
            "--repo",
            "widgets",
            "--perPage",
            "5",
            "--page",
            "1",
        ])
        .unwrap();

        assert_eq!(call.name, "list_branches");
        assert_eq!(call.arg_str("owner"), Some("acme"));
        assert_eq!(call.arg_str("repo"), Some("widgets"));
        assert_eq!(call.arg("perPage"), Some(&ArgValue::Int(5)));
        assert_eq!(call.arg("page"), Some(&ArgValue::Int(1)));
    }

    #[test]
    fn test_switch_flags_default_to_true() {
        let call = encode_command(&["tools", "search", "--recursive", "--path", "/src", "--verbose"])
            .unwrap();
        assert_eq!(call.arg("recursive"), Some(&ArgValue::Bool(true)));
        assert_eq!(call.arg("verbose"), Some(&ArgValue::Bool(true)));
        assert_eq!(call.arg_str("path"), Some("/src"));
    }

    #[test]
    fn test_stray_tokens_are_skipped() {
        let call = encode_command(&["tools", "t", "stray", "--a", "1", "also-stray"]).unwrap();
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arg("a"), Some(&ArgValue::Int(1)));
    }

    #[test]
    fn test_invalid_commands() {
        let too_short = encode_command(&["tools", "list_issues"]).unwrap_err();
        assert_eq!(too_short.kind(), ErrorKind::InvalidRequest);

        let wrong_verb = encode_command(&["call", "list_issues", "--owner", "a"]).unwrap_err();
        assert_eq!(wrong_verb.kind(), ErrorKind::InvalidRequest);

        let empty: [&str; 0] = [];
        assert!(encode_command(&empty).is_err());
    }

    #[test]
    fn test_bare_double_dash_is_ignored() {
        let args = parse_flags(&["--", "x", "--a", "b"]);
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("a"), Some(&ArgValue::String("b".into())));
    }
}
