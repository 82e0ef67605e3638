//! Lanes: named sequences of tool calls

use super::LaneOutcome;
use crate::encoder::{encode_command, COMMAND_VERB};
use crate::error::Result;
use crate::gateway::ToolInvoker;
use crate::types::{OwnerKey, ToolCall};

/// Repository tree lane
pub const REPO_STRUCTURE: &str = "repo_structure";
/// Open issues lane
pub const ISSUES: &str = "issues";
/// Open pull requests lane
pub const PULL_REQUESTS: &str = "pull_requests";
/// Branches lane
pub const BRANCHES: &str = "branches";

/// Page size the standard lanes ask for
pub const STANDARD_PAGE_SIZE: u32 = 5;

/// One category of data, fetched by a fixed sequence of calls
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    /// Category name, used as the key of the run's result map
    pub name: String,
    /// Calls made in order
    pub calls: Vec<ToolCall>,
}

impl Lane {
    /// Lane from ready-made calls
    pub fn new(name: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            name: name.into(),
            calls,
        }
    }

    /// Lane from `<tool> --flag value ...` commands; the `tools` verb is implied
    pub fn from_commands<S: AsRef<str>>(name: impl Into<String>, commands: &[Vec<S>]) -> Result<Self> {
        let calls = commands
            .iter()
            .map(|tokens| {
                let full: Vec<&str> = std::iter::once(COMMAND_VERB)
                    .chain(tokens.iter().map(AsRef::as_ref))
                    .collect();
                encode_command(&full)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, calls))
    }

    /// Run the calls in order under `owner`; the first failure ends the lane
    pub async fn run(&self, invoker: &dyn ToolInvoker, owner: &OwnerKey) -> LaneOutcome {
        let mut results = Vec::with_capacity(self.calls.len());
        for call in &self.calls {
            match invoker.invoke(owner, call).await {
                Ok(result) => results.push(result),
                Err(e) => return LaneOutcome::Failed(format!("{}: {}", call.name, e)),
            }
        }
        LaneOutcome::Completed(results)
    }
}

/// Directory listing lane; `path` is normalized to end with `/`
pub fn repo_structure_lane(owner: &str, repo: &str, path: &str, git_ref: Option<&str>) -> Result<Lane> {
    let mut dir = path.to_string();
    if !dir.ends_with('/') {
        dir.push('/');
    }

    let mut tokens = vec![
        "get_file_contents".to_string(),
        "--owner".to_string(),
        owner.to_string(),
        "--repo".to_string(),
        repo.to_string(),
        "--path".to_string(),
        dir,
    ];
    if let Some(git_ref) = git_ref {
        tokens.push("--ref".to_string());
        tokens.push(git_ref.to_string());
    }
    Lane::from_commands(REPO_STRUCTURE, &[tokens])
}

fn listing(tool: &str, owner: &str, repo: &str, with_state: bool) -> Vec<String> {
    let mut tokens = vec![
        tool.to_string(),
        "--owner".to_string(),
        owner.to_string(),
        "--repo".to_string(),
        repo.to_string(),
    ];
    if with_state {
        tokens.extend(["--state".to_string(), "open".to_string()]);
    }
    tokens.extend([
        "--perPage".to_string(),
        STANDARD_PAGE_SIZE.to_string(),
        "--page".to_string(),
        "1".to_string(),
    ]);
    tokens
}

/// The four standard lanes for one repository
pub fn repository_lanes(owner: &str, repo: &str) -> Result<Vec<Lane>> {
    Ok(vec![
        repo_structure_lane(owner, repo, "/", None)?,
        Lane::from_commands(ISSUES, &[listing("list_issues", owner, repo, true)])?,
        Lane::from_commands(
            PULL_REQUESTS,
            &[listing("list_pull_requests", owner, repo, true)],
        )?,
        Lane::from_commands(BRANCHES, &[listing("list_branches", owner, repo, false)])?,
    ])
}
