//! RepoDoc CLI Library
//!
//! Command definitions and command implementations for the `repodoc`
//! binary, exposed as a library so they can be tested directly.

/// `call` and `tools` commands
pub mod call;
/// Command-line interface definitions and argument parsing
pub mod cli;
/// Setup diagnostics
pub mod doctor;
/// CLI error type carrying an exit code
pub mod error;
/// Exit codes used by the CLI application
pub mod exit_codes;
/// `fetch` and `compare` commands
pub mod fetch;
/// Release pooled connections on Ctrl+C
pub mod signal_handler;
