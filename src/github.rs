//! GitHub API interactions: PR status, merges, reviewers, review-requested
//! search, token validation, and branch listing.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{PrStatus, ReviewRequest};

/// GitHub API base URL
const GITHUB_API_BASE: &str = "https://api.github.com";

/// User-Agent header required by GitHub API
const USER_AGENT: &str = "deckhand-cli";

/// Errors from the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Token is invalid or expired (401 Unauthorized)
    #[error("Invalid or expired token: GitHub returned 401 Unauthorized")]
    Unauthorized,

    /// Token lacks required permissions (403 Forbidden)
    #[error("Token lacks required permissions: GitHub returned 403 Forbidden")]
    Forbidden,

    /// The URL is not a recognizable GitHub pull request URL
    #[error("Not a GitHub pull request URL: {0}")]
    InvalidPrUrl(String),

    /// GitHub refused a merge (405 Method Not Allowed)
    #[error("Pull request is not mergeable: {0}")]
    NotMergeable(String),

    /// Network or other HTTP error
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Failed to parse response
    #[error("Failed to parse GitHub response: {0}")]
    ParseError(String),
}

/// Response from GitHub GET /user endpoint (only fields we care about).
#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
}

/// Owner, repo, and number parsed out of a PR URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Parse `https://github.com/{owner}/{repo}/pull/{number}` into its parts.
pub fn parse_pr_url(url: &str) -> Result<PrRef, GitHubError> {
    let rest = url
        .strip_prefix("https://github.com/")
        .ok_or_else(|| GitHubError::InvalidPrUrl(url.to_string()))?;

    let mut parts = rest.split('/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let repo = parts.next().filter(|s| !s.is_empty());
    let pull = parts.next();
    let number = parts.next().and_then(|n| n.parse::<u64>().ok());

    match (owner, repo, pull, number) {
        (Some(owner), Some(repo), Some("pull"), Some(number)) => Ok(PrRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        }),
        _ => Err(GitHubError::InvalidPrUrl(url.to_string())),
    }
}

fn authed(method: &str, url: &str, token: &str) -> ureq::Request {
    ureq::request(method, url)
        .set("Authorization", &format!("Bearer {token}"))
        .set("Accept", "application/vnd.github+json")
        .set("User-Agent", USER_AGENT)
        .set("X-GitHub-Api-Version", "2022-11-28")
}

fn classify_error(error: ureq::Error) -> GitHubError {
    match error {
        ureq::Error::Status(401, _) => GitHubError::Unauthorized,
        ureq::Error::Status(403, _) => GitHubError::Forbidden,
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            GitHubError::HttpError(format!("HTTP {code}: {body}"))
        }
        e => GitHubError::HttpError(e.to_string()),
    }
}

/// Validate a GitHub token via the GET /user endpoint.
pub fn validate_token(token: &str) -> Result<GitHubUser, GitHubError> {
    let url = format!("{GITHUB_API_BASE}/user");
    let response = authed("GET", &url, token).call();

    match response {
        Ok(resp) => resp
            .into_json()
            .map_err(|e| GitHubError::ParseError(e.to_string())),
        Err(e) => Err(classify_error(e)),
    }
}

/// Raw PR fields needed to classify its status.
#[derive(Debug, Deserialize)]
struct PullResponse {
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged: bool,
}

/// Classify a PR: draft wins over everything, then merged, then the raw
/// open/closed state.
fn classify_pr(state: &str, draft: bool, merged: bool) -> PrStatus {
    if draft {
        PrStatus::Draft
    } else if merged {
        PrStatus::Merged
    } else if state == "closed" {
        PrStatus::Closed
    } else {
        PrStatus::Open
    }
}

/// Fetch and classify the status of a pull request by URL.
pub fn pr_status(token: &str, pr_url: &str) -> Result<PrStatus, GitHubError> {
    let pr = parse_pr_url(pr_url)?;
    let url = format!(
        "{GITHUB_API_BASE}/repos/{}/{}/pulls/{}",
        pr.owner, pr.repo, pr.number
    );
    let response = authed("GET", &url, token).call();

    match response {
        Ok(resp) => {
            let pull: PullResponse = resp
                .into_json()
                .map_err(|e| GitHubError::ParseError(e.to_string()))?;
            Ok(classify_pr(&pull.state, pull.draft, pull.merged))
        }
        Err(e) => Err(classify_error(e)),
    }
}

/// Outcome of a merge call.
#[derive(Debug, Deserialize)]
pub struct MergeResult {
    pub merged: bool,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Merge a pull request. `method` is one of `squash`, `merge`, `rebase`;
/// squash is the default.
pub fn merge_pr(
    token: &str,
    pr_url: &str,
    method: Option<&str>,
) -> Result<MergeResult, GitHubError> {
    let pr = parse_pr_url(pr_url)?;
    let url = format!(
        "{GITHUB_API_BASE}/repos/{}/{}/pulls/{}/merge",
        pr.owner, pr.repo, pr.number
    );
    let response = authed("PUT", &url, token).send_json(serde_json::json!({
        "merge_method": method.unwrap_or("squash"),
    }));

    match response {
        Ok(resp) => resp
            .into_json()
            .map_err(|e| GitHubError::ParseError(e.to_string())),
        Err(ureq::Error::Status(405, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(GitHubError::NotMergeable(body))
        }
        Err(e) => Err(classify_error(e)),
    }
}

/// Request reviews from the given GitHub logins on a pull request.
pub fn request_reviewers(
    token: &str,
    pr_url: &str,
    reviewers: &[String],
) -> Result<(), GitHubError> {
    let pr = parse_pr_url(pr_url)?;
    let url = format!(
        "{GITHUB_API_BASE}/repos/{}/{}/pulls/{}/requested_reviewers",
        pr.owner, pr.repo, pr.number
    );
    let response = authed("POST", &url, token).send_json(serde_json::json!({
        "reviewers": reviewers,
    }));

    match response {
        Ok(_) => Ok(()),
        Err(e) => Err(classify_error(e)),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    html_url: String,
    number: u64,
    repository_url: String,
    user: SearchUser,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct SearchUser {
    login: String,
}

/// Open pull requests where the authenticated user's review is requested.
pub fn review_requests(token: &str) -> Result<Vec<ReviewRequest>, GitHubError> {
    let user = validate_token(token)?;
    let url = format!(
        "{GITHUB_API_BASE}/search/issues?q=type:pr+state:open+review-requested:{}&sort=updated&order=desc",
        user.login
    );
    let response = authed("GET", &url, token).call();

    match response {
        Ok(resp) => {
            let search: SearchResponse = resp
                .into_json()
                .map_err(|e| GitHubError::ParseError(e.to_string()))?;
            Ok(search
                .items
                .into_iter()
                .map(|item| ReviewRequest {
                    title: item.title,
                    url: item.html_url,
                    number: item.number,
                    repo: item
                        .repository_url
                        .trim_start_matches("https://api.github.com/repos/")
                        .to_string(),
                    author: item.user.login,
                    updated_at: item.updated_at,
                })
                .collect())
        }
        Err(e) => Err(classify_error(e)),
    }
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
}

/// Branch names of a repository, by its `https://github.com/{owner}/{name}`
/// URL. Capped at the API's 100-per-page maximum.
pub fn branches(token: &str, repo_url: &str) -> Result<Vec<String>, GitHubError> {
    let rest = repo_url
        .strip_prefix("https://github.com/")
        .ok_or_else(|| GitHubError::InvalidPrUrl(repo_url.to_string()))?;
    let mut parts = rest.split('/');
    let (owner, name) = match (parts.next(), parts.next()) {
        (Some(o), Some(n)) if !o.is_empty() && !n.is_empty() => (o, n),
        _ => return Err(GitHubError::InvalidPrUrl(repo_url.to_string())),
    };

    let url = format!("{GITHUB_API_BASE}/repos/{owner}/{name}/branches?per_page=100");
    let response = authed("GET", &url, token).call();

    match response {
        Ok(resp) => {
            let branches: Vec<BranchResponse> = resp
                .into_json()
                .map_err(|e| GitHubError::ParseError(e.to_string()))?;
            Ok(branches.into_iter().map(|b| b.name).collect())
        }
        Err(e) => Err(classify_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_url() {
        let pr = parse_pr_url("https://github.com/acme/web/pull/42").unwrap();
        assert_eq!(pr.owner, "acme");
        assert_eq!(pr.repo, "web");
        assert_eq!(pr.number, 42);
    }

    #[test]
    fn test_parse_pr_url_rejects_non_pr_urls() {
        assert!(parse_pr_url("https://github.com/acme/web").is_err());
        assert!(parse_pr_url("https://github.com/acme/web/issues/42").is_err());
        assert!(parse_pr_url("https://github.com/acme/web/pull/abc").is_err());
        assert!(parse_pr_url("https://gitlab.com/acme/web/pull/42").is_err());
        assert!(parse_pr_url("").is_err());
    }

    #[test]
    fn test_classify_draft_wins_over_merged() {
        // GitHub never reports both in practice; draft still takes priority
        assert_eq!(classify_pr("open", true, true), PrStatus::Draft);
        assert_eq!(classify_pr("open", true, false), PrStatus::Draft);
    }

    #[test]
    fn test_classify_merged_wins_over_closed() {
        // Merged PRs report state "closed"
        assert_eq!(classify_pr("closed", false, true), PrStatus::Merged);
    }

    #[test]
    fn test_classify_closed_and_open() {
        assert_eq!(classify_pr("closed", false, false), PrStatus::Closed);
        assert_eq!(classify_pr("open", false, false), PrStatus::Open);
    }

    #[test]
    fn test_pull_response_deserialize() {
        let json = r#"{ "state": "open", "draft": false, "merged": false, "title": "x" }"#;
        let pull: PullResponse = serde_json::from_str(json).unwrap();
        assert_eq!(pull.state, "open");
        assert!(!pull.draft);
    }

    #[test]
    fn test_merge_result_deserialize() {
        let json = r#"{ "merged": true, "sha": "abc123", "message": "Pull Request successfully merged" }"#;
        let result: MergeResult = serde_json::from_str(json).unwrap();
        assert!(result.merged);
        assert_eq!(result.sha.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_search_response_maps_to_review_requests() {
        let json = r#"{
            "items": [
                {
                    "title": "Add retry logic",
                    "html_url": "https://github.com/acme/web/pull/7",
                    "number": 7,
                    "repository_url": "https://api.github.com/repos/acme/web",
                    "user": { "login": "dev1" },
                    "updated_at": "2026-08-01T12:00:00Z"
                }
            ]
        }"#;

        let search: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(search.items.len(), 1);
        assert_eq!(search.items[0].number, 7);
        assert_eq!(
            search.items[0]
                .repository_url
                .trim_start_matches("https://api.github.com/repos/"),
            "acme/web"
        );
    }

    #[test]
    fn test_branch_response_deserialize() {
        let json = r#"[{ "name": "main" }, { "name": "agent/fix-login" }]"#;
        let branches: Vec<BranchResponse> = serde_json::from_str(json).unwrap();
        let names: Vec<_> = branches.into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["main", "agent/fix-login"]);
    }

    #[test]
    fn test_github_user_deserialize() {
        let json = r#"{ "login": "testuser", "id": 12345, "name": "Test User" }"#;
        let user: GitHubUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.login, "testuser");
        assert_eq!(user.id, 12345);
    }
}
