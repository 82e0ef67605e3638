//! Basic usage example for the RepoDoc gateway
//!
//! Needs a built `github-mcp-server` (see `GatewayConfig`) and a token in
//! `GITHUB_PERSONAL_ACCESS_TOKEN`.

use repodoc::prelude::*;
use repodoc::repository_lanes;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load(None);
    let workers = config.workers;
    let lane_timeout = config.lane_timeout();
    let gateway = Arc::new(ToolGateway::new(config));

    // A single call, encoded from command tokens
    let branches = gateway
        .execute(
            &OwnerKey::new("example"),
            &["tools", "list_branches", "--owner", "github", "--repo", "github-mcp-server", "--perPage", "5"],
        )
        .await?;
    println!("Branches:");
    for branch in branches.into_records() {
        println!("  - {}", branch["name"].as_str().unwrap_or("?"));
    }

    // The four standard lanes, fetched concurrently
    let runner = LaneRunner::new(
        Arc::clone(&gateway) as Arc<dyn ToolInvoker>,
        Scheduling::WorkerPool { workers },
        lane_timeout,
    );
    let run = runner.run(repository_lanes("github", "github-mcp-server")?).await;
    for (lane, outcome) in &run.outcomes {
        match outcome {
            LaneOutcome::Completed(_) => println!("{lane}: {} record(s)", outcome.records().len()),
            LaneOutcome::Failed(reason) => println!("{lane}: failed ({reason})"),
        }
    }

    let stats = gateway.stats();
    println!(
        "{} call(s), {} process(es), cache hit rate {:.0}%",
        stats.calls,
        stats.processes_spawned,
        stats.hit_rate() * 100.0
    );

    gateway.shutdown().await;
    Ok(())
}
