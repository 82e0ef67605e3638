use clap::CommandFactory;
use repodoc::{GatewayConfig, ToolGateway};
use repodoc_cli::cli::{Cli, Commands};
use repodoc_cli::doctor::Doctor;
use repodoc_cli::error::handle_cli_result;
use repodoc_cli::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use repodoc_cli::{call, fetch, signal_handler};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Fast path for help - avoid loading configuration
    let Some(command) = cli.command else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Failed to print help: {e}");
            process::exit(EXIT_ERROR);
        }
        process::exit(EXIT_SUCCESS);
    };

    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    // Logs go to stderr; stdout carries the JSON results
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(log_level).into()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let mut config = GatewayConfig::load(cli.config.as_deref());
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    tracing::debug!("Gateway mode: {}", config.mode);

    let exit_code = match command {
        Commands::Call { tool, args } => {
            with_gateway(config, |gateway| async move {
                call::run_call(&gateway, &tool, &args).await
            })
            .await
        }
        Commands::Tools => {
            with_gateway(config, |gateway| async move { call::run_tools(&gateway).await }).await
        }
        Commands::Fetch {
            owner,
            repo,
            scheduling,
        } => {
            let scheduling = scheduling.with_workers(config.workers);
            with_gateway(config, |gateway| async move {
                fetch::run_fetch(gateway, &owner, &repo, scheduling).await
            })
            .await
        }
        Commands::Compare {
            owner,
            repo,
            format,
        } => handle_cli_result(fetch::run_compare(&config, &owner, &repo, format).await),
        Commands::Doctor => run_doctor(config, cli.config),
    };

    process::exit(exit_code);
}

/// Run a command against a shared gateway, releasing its connections on
/// completion and on Ctrl+C
async fn with_gateway<F, Fut>(config: GatewayConfig, command: F) -> i32
where
    F: FnOnce(Arc<ToolGateway>) -> Fut,
    Fut: std::future::Future<Output = repodoc_cli::error::CliResult<i32>>,
{
    let gateway = Arc::new(ToolGateway::new(config));
    signal_handler::release_on_signal(Arc::clone(&gateway));

    let result = command(Arc::clone(&gateway)).await;
    gateway.shutdown().await;
    handle_cli_result(result)
}

fn run_doctor(config: GatewayConfig, config_path: Option<PathBuf>) -> i32 {
    let mut doctor = Doctor::new(config, config_path);
    match doctor.run_diagnostics() {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!("Doctor error: {}", e);
            EXIT_ERROR
        }
    }
}
