//! Direct GitHub REST API client used when the tool server is unavailable
//!
//! Every listing operation returns a list of records, or an empty list when
//! the request fails. Failures are logged, never raised.

use super::ToolBackend;
use crate::config::{AccessToken, GatewayConfig};
use crate::error::Result;
use crate::types::{ToolCall, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("repodoc/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github.v3+json";

/// Page sizes used when the call does not say
pub const DEFAULT_ISSUES_PER_PAGE: u64 = 5;
/// Default pull request page size
pub const DEFAULT_PULLS_PER_PAGE: u64 = 5;
/// Default branch page size
pub const DEFAULT_BRANCHES_PER_PAGE: u64 = 10;

/// Filter for issue and pull request listings
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// `open`, `closed` or `all`
    pub state: Option<String>,
    /// Page size
    pub per_page: Option<u64>,
    /// 1-based page number
    pub page: Option<u64>,
    /// Sort field (pull requests only)
    pub sort: Option<String>,
    /// `asc` or `desc` (pull requests only)
    pub direction: Option<String>,
}

impl ListQuery {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            state: call.arg_str("state").map(str::to_string),
            per_page: call.arg_u64("perPage"),
            page: call.arg_u64("page"),
            sort: call.arg_str("sort").map(str::to_string),
            direction: call.arg_str("direction").map(str::to_string),
        }
    }

    fn pairs(&self, default_per_page: u64, with_state: bool, with_order: bool) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if with_state {
            pairs.push(("state", self.state.clone().unwrap_or_else(|| "open".to_string())));
        }
        if with_order {
            if let Some(sort) = &self.sort {
                pairs.push(("sort", sort.clone()));
            }
            if let Some(direction) = &self.direction {
                pairs.push(("direction", direction.clone()));
            }
        }
        pairs.push(("per_page", self.per_page.unwrap_or(default_per_page).to_string()));
        pairs.push(("page", self.page.unwrap_or(1).to_string()));
        pairs
    }
}

/// Bearer-authenticated GitHub REST client
#[derive(Debug, Clone)]
pub struct GitHubApiBackend {
    client: Client,
    base_url: String,
    token: Option<AccessToken>,
}

impl GitHubApiBackend {
    /// Client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, token: Option<AccessToken>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client configured from the gateway settings
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Self::new(
            &config.github_api_url,
            config.access_token.clone(),
            config.http_timeout(),
        )
    }

    /// Entries of a directory, or a one-element list for a file
    pub async fn get_repo_contents(&self, owner: &str, repo: &str, path: &str) -> Vec<Value> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            owner,
            repo,
            path.trim_start_matches('/')
        );
        match self.get_json(&url, &[]).await {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single],
        }
    }

    /// Issues of a repository
    pub async fn list_issues(&self, owner: &str, repo: &str, query: &ListQuery) -> Vec<Value> {
        let url = format!("{}/repos/{}/{}/issues", self.base_url, owner, repo);
        self.get_list(&url, &query.pairs(DEFAULT_ISSUES_PER_PAGE, true, false))
            .await
    }

    /// Pull requests of a repository
    pub async fn list_pull_requests(&self, owner: &str, repo: &str, query: &ListQuery) -> Vec<Value> {
        let url = format!("{}/repos/{}/{}/pulls", self.base_url, owner, repo);
        self.get_list(&url, &query.pairs(DEFAULT_PULLS_PER_PAGE, true, true))
            .await
    }

    /// Branches of a repository
    pub async fn list_branches(&self, owner: &str, repo: &str, query: &ListQuery) -> Vec<Value> {
        let url = format!("{}/repos/{}/{}/branches", self.base_url, owner, repo);
        self.get_list(&url, &query.pairs(DEFAULT_BRANCHES_PER_PAGE, false, false))
            .await
    }

    /// Repository metadata
    pub async fn get_repository(&self, owner: &str, repo: &str) -> Option<Value> {
        let url = format!("{}/repos/{}/{}", self.base_url, owner, repo);
        self.get_json(&url, &[]).await.filter(Value::is_object)
    }

    async fn get_list(&self, url: &str, query: &[(&str, String)]) -> Vec<Value> {
        match self.get_json(url, query).await {
            Some(Value::Array(items)) => items,
            Some(other) => {
                tracing::warn!("Expected a list from {}, got {}", url, type_name(&other));
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Option<Value> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        tracing::debug!("GET {}", url);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("GitHub API request to {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("GitHub API returned {} for {}", status, url);
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("GitHub API response from {} was not JSON: {}", url, e);
                None
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ToolBackend for GitHubApiBackend {
    fn name(&self) -> &str {
        "github-api"
    }

    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult> {
        let owner = call.arg_str("owner").unwrap_or_default();
        let repo = call.arg_str("repo").unwrap_or_default();
        let query = ListQuery::from_call(call);

        let records = match call.name.as_str() {
            "get_file_contents" => {
                let path = call.arg_str("path").unwrap_or("/");
                self.get_repo_contents(owner, repo, path).await
            }
            "list_issues" => self.list_issues(owner, repo, &query).await,
            "list_pull_requests" => self.list_pull_requests(owner, repo, &query).await,
            "list_branches" => self.list_branches(owner, repo, &query).await,
            "get_repository" => {
                return Ok(self
                    .get_repository(owner, repo)
                    .await
                    .map(ToolResult::from_value)
                    .unwrap_or_else(ToolResult::none));
            }
            other => {
                tracing::warn!("Fallback backend has no tool named '{}'", other);
                return Ok(ToolResult::none());
            }
        };

        Ok(ToolResult::from_value(Value::Array(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn backend(url: &str) -> GitHubApiBackend {
        GitHubApiBackend::new(url, Some(AccessToken::new("ghp_test")), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_branches_uses_defaults_and_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets/branches")
            .match_header("authorization", "Bearer ghp_test")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "10".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name":"main"}]"#)
            .create_async()
            .await;

        let call = ToolCall::new("list_branches")
            .with_arg("owner", "acme")
            .with_arg("repo", "widgets");
        let result = backend(&server.url()).invoke(&call).await.unwrap();

        assert_eq!(result.as_value(), &json!([{"name": "main"}]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_requests_forward_sort_and_direction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets/pulls")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "closed".into()),
                Matcher::UrlEncoded("sort".into(), "updated".into()),
                Matcher::UrlEncoded("direction".into(), "desc".into()),
                Matcher::UrlEncoded("per_page".into(), "5".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"number":7}]"#)
            .create_async()
            .await;

        let call = ToolCall::new("list_pull_requests")
            .with_arg("owner", "acme")
            .with_arg("repo", "widgets")
            .with_arg("state", "closed")
            .with_arg("sort", "updated")
            .with_arg("direction", "desc")
            .with_arg("page", 2i64);
        let result = backend(&server.url()).invoke(&call).await.unwrap();

        assert_eq!(result.into_records(), vec![json!({"number": 7})]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failure_yields_empty_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let records = backend(&server.url())
            .list_issues("acme", "widgets", &ListQuery::default())
            .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_single_file_contents_becomes_one_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/contents/README.md")
            .with_status(200)
            .with_body(r#"{"name":"README.md","type":"file"}"#)
            .create_async()
            .await;

        let records = backend(&server.url())
            .get_repo_contents("acme", "widgets", "/README.md")
            .await;
        assert_eq!(records, vec![json!({"name": "README.md", "type": "file"})]);
    }

    #[tokio::test]
    async fn test_repository_metadata_and_unknown_tool() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets")
            .with_status(200)
            .with_body(r#"{"full_name":"acme/widgets"}"#)
            .create_async()
            .await;
        let api = backend(&server.url());

        let call = ToolCall::new("get_repository")
            .with_arg("owner", "acme")
            .with_arg("repo", "widgets");
        let result = api.invoke(&call).await.unwrap();
        assert_eq!(result.as_value()["full_name"], "acme/widgets");

        let unknown = api.invoke(&ToolCall::new("delete_everything")).await.unwrap();
        assert!(unknown.is_absent());
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_empty_list() {
        let api = GitHubApiBackend::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        assert!(api
            .list_branches("acme", "widgets", &ListQuery::default())
            .await
            .is_empty());
        assert!(api.get_repository("acme", "widgets").await.is_none());
    }
}
