use clap::{Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use repodoc::{GatewayMode, Scheduling};
use std::io;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// A new tool-server process per call, no cache
    Fresh,
    /// One long-lived process per owner, with the result cache
    Pooled,
}

impl From<ModeArg> for GatewayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fresh => GatewayMode::FreshProcess,
            ModeArg::Pooled => GatewayMode::Pooled,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingArg {
    /// A fixed number of workers (the `workers` setting)
    Pool,
    /// One worker per lane
    Threads,
}

impl SchedulingArg {
    pub fn with_workers(self, workers: usize) -> Scheduling {
        match self {
            SchedulingArg::Pool => Scheduling::WorkerPool { workers },
            SchedulingArg::Threads => Scheduling::ThreadPerLane,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "repodoc")]
#[command(version)]
#[command(about = "Run GitHub tool calls through a local tool server")]
#[command(long_about = "
repodoc drives a github-mcp-server subprocess over stdio. Calls are encoded
from `--flag value` tokens, answered by a pooled server process, cached on
disk for a few minutes, and printed as JSON.

Example usage:
  repodoc call list_branches --owner acme --repo widgets --perPage 5
  repodoc fetch acme widgets           # Structure, issues, PRs and branches
  repodoc compare acme widgets         # Fresh-process vs pooled timings
  repodoc doctor                       # Check the setup
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// YAML configuration file (default: $REPODOC_CONFIG or ~/.repodoc/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the gateway mode
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single tool call and print its result
    #[command(long_about = "
Encodes the arguments exactly like a `tools <name> --flag value ...` command
and runs it. Values are typed: true/false become booleans, digits become
integers, digits.digits become floats; everything else stays a string. A
flag followed by another flag (or nothing) is a boolean true.

Examples:
  repodoc call list_issues --owner acme --repo widgets --state open
  repodoc call get_file_contents --owner acme --repo widgets --path src/
")]
    Call {
        /// Tool name
        tool: String,

        /// `--flag value` pairs passed to the tool
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List the tools the server offers
    Tools,
    /// Fetch structure, issues, pull requests and branches in parallel
    #[command(long_about = "
Runs the four standard lanes (repo_structure, issues, pull_requests,
branches) concurrently and prints one entry per lane: {\"ok\": [...]} or
{\"error\": \"...\"}. A failing lane never hides the others.

Exit codes:
  0 - Every lane succeeded
  1 - At least one lane failed (including an unreachable tool server)
  2 - The lanes could not be built
")]
    Fetch {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// How lanes are mapped onto workers
        #[arg(long, value_enum, default_value = "pool")]
        scheduling: SchedulingArg,
    },
    /// Time the standard lanes with fresh processes, then pooled
    Compare {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Diagnose configuration and setup issues
    #[command(long_about = "
Checks that the tool server can be found, that an access token is set, that
the cache directory is writable and that the configuration is valid.

Exit codes:
  0 - All checks passed
  1 - Warnings found
  2 - Errors found
")]
    Doctor,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }

    pub fn is_tty() -> bool {
        io::stdout().is_terminal()
    }

    pub fn should_use_color() -> bool {
        Self::is_tty() && std::env::var("NO_COLOR").is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_help_works() {
        let result = Cli::try_parse_from_args(["repodoc", "--help"]);
        let error = result.unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_no_subcommand() {
        let cli = Cli::try_parse_from_args(["repodoc"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(!cli.quiet);
        assert!(cli.mode.is_none());
    }

    #[test]
    fn test_call_keeps_flag_tokens() {
        let cli = Cli::try_parse_from_args([
            "repodoc",
            "call",
            "list_issues",
            "--owner",
            "acme",
            "--state",
            "open",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Call { tool, args }) => {
                assert_eq!(tool, "list_issues");
                assert_eq!(args, vec!["--owner", "acme", "--state", "open"]);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from_args([
            "repodoc", "fetch", "acme", "widgets", "--mode", "fresh", "-q",
        ])
        .unwrap();

        assert_eq!(cli.mode, Some(ModeArg::Fresh));
        assert!(cli.quiet);
        match cli.command {
            Some(Commands::Fetch { scheduling, .. }) => {
                assert_eq!(scheduling, SchedulingArg::Pool);
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_scheduling_maps_onto_workers() {
        assert_eq!(
            SchedulingArg::Pool.with_workers(3),
            Scheduling::WorkerPool { workers: 3 }
        );
        assert_eq!(
            SchedulingArg::Threads.with_workers(3),
            Scheduling::ThreadPerLane
        );
        assert_eq!(GatewayMode::from(ModeArg::Fresh), GatewayMode::FreshProcess);
    }

    #[test]
    fn test_cli_invalid_subcommand() {
        let error = Cli::try_parse_from_args(["repodoc", "serve"]).unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}
