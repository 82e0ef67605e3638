//! `repodoc fetch` and `repodoc compare`

use crate::call::print_json;
use crate::cli::OutputFormat;
use crate::error::CliResult;
use crate::exit_codes::{EXIT_SUCCESS, EXIT_WARNING};
use colored::*;
use repodoc::{
    repository_lanes, GatewayConfig, GatewayMode, LaneRunner, ParallelRun, Scheduling,
    StatsSnapshot, ToolGateway, ToolInvoker,
};
use serde::Serialize;
use std::sync::Arc;

/// Run the four standard lanes through `gateway`
pub async fn run_lanes(
    gateway: Arc<ToolGateway>,
    owner: &str,
    repo: &str,
    scheduling: Scheduling,
) -> CliResult<ParallelRun> {
    let lanes = repository_lanes(owner, repo)?;
    let lane_timeout = gateway.config().lane_timeout();
    let runner = LaneRunner::new(gateway as Arc<dyn ToolInvoker>, scheduling, lane_timeout);
    Ok(runner.run(lanes).await)
}

pub async fn run_fetch(
    gateway: Arc<ToolGateway>,
    owner: &str,
    repo: &str,
    scheduling: Scheduling,
) -> CliResult<i32> {
    let run = run_lanes(gateway, owner, repo, scheduling).await?;
    print_json(&run)?;

    let failed = run.failed_lanes();
    if failed.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        tracing::warn!("{} of {} lane(s) failed: {}", failed.len(), run.len(), failed.join(", "));
        Ok(EXIT_WARNING)
    }
}

/// Timing of one mode in a comparison
#[derive(Debug, Clone, Serialize)]
pub struct ModeReport {
    pub mode: String,
    pub elapsed_ms: u64,
    pub lanes_ok: usize,
    pub lanes_failed: usize,
    pub stats: StatsSnapshot,
}

impl ModeReport {
    fn new(mode: GatewayMode, run: &ParallelRun, stats: StatsSnapshot) -> Self {
        let lanes_failed = run.failed_lanes().len();
        Self {
            mode: mode.to_string(),
            elapsed_ms: u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX),
            lanes_ok: run.len() - lanes_failed,
            lanes_failed,
            stats,
        }
    }
}

/// Fresh-process run next to a pooled run of the same lanes
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub fresh: ModeReport,
    pub pooled: ModeReport,
    /// Fresh wall time divided by pooled wall time
    pub speedup: f64,
}

impl Comparison {
    pub fn new(fresh: ModeReport, pooled: ModeReport) -> Self {
        let speedup = if pooled.elapsed_ms == 0 {
            0.0
        } else {
            fresh.elapsed_ms as f64 / pooled.elapsed_ms as f64
        };
        Self {
            fresh,
            pooled,
            speedup,
        }
    }
}

async fn timed_run(
    config: &GatewayConfig,
    mode: GatewayMode,
    owner: &str,
    repo: &str,
) -> CliResult<ModeReport> {
    let mut config = config.clone();
    config.mode = mode;
    let scheduling = Scheduling::WorkerPool {
        workers: config.workers,
    };
    let gateway = Arc::new(ToolGateway::new(config));

    tracing::info!("Running lanes in {} mode", mode);
    let outcome = run_lanes(Arc::clone(&gateway), owner, repo, scheduling).await;
    let stopped = gateway.shutdown().await;
    tracing::debug!("Stopped {} connection(s) after {} run", stopped, mode);

    let run = outcome?;
    Ok(ModeReport::new(mode, &run, gateway.stats()))
}

pub async fn run_compare(
    config: &GatewayConfig,
    owner: &str,
    repo: &str,
    format: OutputFormat,
) -> CliResult<i32> {
    let fresh = timed_run(config, GatewayMode::FreshProcess, owner, repo).await?;
    let pooled = timed_run(config, GatewayMode::Pooled, owner, repo).await?;
    let comparison = Comparison::new(fresh, pooled);

    match format {
        OutputFormat::Json => print_json(&comparison)?,
        OutputFormat::Text => print_comparison(&comparison, crate::cli::Cli::should_use_color()),
    }

    let failures = comparison.fresh.lanes_failed + comparison.pooled.lanes_failed;
    Ok(if failures == 0 { EXIT_SUCCESS } else { EXIT_WARNING })
}

fn print_comparison(comparison: &Comparison, use_color: bool) {
    let title = "Gateway comparison";
    if use_color {
        println!("{}", title.bold().blue());
    } else {
        println!("{title}");
    }

    for report in [&comparison.fresh, &comparison.pooled] {
        println!(
            "  {:<14} {:>8} ms  lanes ok {}/{}  spawned {}  cache hits {}",
            report.mode,
            report.elapsed_ms,
            report.lanes_ok,
            report.lanes_ok + report.lanes_failed,
            report.stats.processes_spawned,
            report.stats.cache_hits,
        );
    }

    let speedup = format!("{:.2}x", comparison.speedup);
    if use_color {
        println!("  Pooled speedup: {}", speedup.green());
    } else {
        println!("  Pooled speedup: {speedup}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodoc::LaneOutcome;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn run_with(failed: usize, elapsed_ms: u64) -> ParallelRun {
        let mut outcomes = BTreeMap::new();
        outcomes.insert("branches".to_string(), LaneOutcome::Completed(Vec::new()));
        for i in 0..failed {
            outcomes.insert(format!("lane{i}"), LaneOutcome::Failed("boom".to_string()));
        }
        ParallelRun {
            outcomes,
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    #[test]
    fn test_mode_report_counts_lanes() {
        let report = ModeReport::new(
            GatewayMode::Pooled,
            &run_with(2, 40),
            StatsSnapshot::default(),
        );
        assert_eq!(report.mode, "pooled");
        assert_eq!(report.lanes_ok, 1);
        assert_eq!(report.lanes_failed, 2);
        assert_eq!(report.elapsed_ms, 40);
    }

    #[test]
    fn test_speedup() {
        let fresh = ModeReport::new(GatewayMode::FreshProcess, &run_with(0, 300), StatsSnapshot::default());
        let pooled = ModeReport::new(GatewayMode::Pooled, &run_with(0, 100), StatsSnapshot::default());
        let comparison = Comparison::new(fresh, pooled);
        assert!((comparison.speedup - 3.0).abs() < 1e-9);

        let json = serde_json::to_value(&comparison).unwrap();
        assert_eq!(json["fresh"]["mode"], "fresh");
        assert_eq!(json["pooled"]["elapsed_ms"], 100);
    }

    #[test]
    fn test_zero_pooled_time_has_no_speedup() {
        let fresh = ModeReport::new(GatewayMode::FreshProcess, &run_with(0, 10), StatsSnapshot::default());
        let pooled = ModeReport::new(GatewayMode::Pooled, &run_with(0, 0), StatsSnapshot::default());
        assert_eq!(Comparison::new(fresh, pooled).speedup, 0.0);
    }
}
