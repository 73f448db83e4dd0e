//! Command implementations for the Deckhand CLI.
//!
//! Each command returns a result struct implementing [`Output`], which the
//! binary prints as JSON (default) or human-readable text (`-H`). Commands
//! take the store and clients as arguments so tests can run them against
//! an in-memory store and a fake service.

use std::path::PathBuf;

use base64::Engine;
use serde::Serialize;

use crate::agent_service::AgentService;
use crate::cache::{self, CacheRead};
use crate::github;
use crate::grid::GridEngine;
use crate::models::{
    Agent, AgentSource, AgentTarget, ConversationMessage, FollowUpRequest, GridItem,
    ImageDimension, LaunchRequest, Prompt, PromptImage, Repository, ReviewRequest,
};
use crate::store::Store;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// The stored API key, or the error telling the user how to set one.
pub fn require_api_key(store: &Store) -> Result<String> {
    store.api_key().ok_or(Error::NotConfigured)
}

/// The stored GitHub token, or an instructive error.
pub fn require_github_token(store: &Store) -> Result<String> {
    store.github_token().ok_or_else(|| {
        Error::InvalidInput("no GitHub token: run `dh config set github-token <token>`".to_string())
    })
}

// --- attachments ---

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Width and height from a PNG header (signature plus IHDR chunk).
fn png_dimensions(bytes: &[u8]) -> Option<ImageDimension> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some(ImageDimension { width, height })
}

/// Read prompt attachments from disk. Only PNG is accepted: the service
/// wants pixel dimensions with each image, and PNG carries them in a fixed
/// header.
pub fn load_images(paths: &[PathBuf]) -> Result<Vec<PromptImage>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)?;
            let dimension = png_dimensions(&bytes).ok_or_else(|| {
                Error::InvalidInput(format!("{} is not a PNG image", path.display()))
            })?;
            Ok(PromptImage {
                data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                dimension,
            })
        })
        .collect()
}

// --- launch ---

/// Arguments for launching a new agent.
#[derive(Debug, Default)]
pub struct LaunchArgs {
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub pr_url: Option<String>,
    pub prompt: String,
    pub model: Option<String>,
    pub branch: Option<String>,
    pub auto_create_pr: bool,
    pub images: Vec<PromptImage>,
}

#[derive(Debug, Serialize)]
pub struct LaunchResult {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Output for LaunchResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Launched {} ({}) - {}", self.name, self.id, self.status);
        if let Some(url) = &self.url {
            out.push_str(&format!("\n  {url}"));
        }
        out
    }
}

/// Launch a new agent and add it to the grid.
///
/// The grid slot is claimed optimistically before the create call. On
/// failure the slot survives as a stub so the next `dh grid show` makes
/// the failed launch visible instead of silently vanishing.
pub fn launch(store: Store, service: &dyn AgentService, args: LaunchArgs) -> Result<LaunchResult> {
    if args.prompt.trim().is_empty() {
        return Err(Error::InvalidInput("prompt must not be empty".to_string()));
    }

    let target = if args.branch.is_some() || args.auto_create_pr {
        Some(AgentTarget {
            branch_name: args.branch.clone(),
            auto_create_pr: args.auto_create_pr,
            ..AgentTarget::default()
        })
    } else {
        None
    };
    let request = LaunchRequest {
        prompt: Prompt {
            text: args.prompt,
            images: args.images,
        },
        model: args.model,
        source: AgentSource {
            repository: args.repository,
            git_ref: args.git_ref,
            pr_url: args.pr_url,
        },
        target,
    };

    let mut engine = GridEngine::new(store);
    let temp = engine.begin_launch(&request)?;

    match service.create(&request) {
        Ok(agent) => {
            engine.complete_launch(&temp, &agent.id)?;
            Ok(LaunchResult {
                id: agent.id,
                name: agent.name,
                status: agent.status.label().to_string(),
                url: agent.target.url,
            })
        }
        Err(e) => {
            engine.fail_launch(&temp, e.to_string());
            Err(e.into())
        }
    }
}

/// Launch an agent that reviews a pull request.
pub fn review(
    store: Store,
    service: &dyn AgentService,
    pr_url: &str,
    model: Option<String>,
) -> Result<LaunchResult> {
    // Validate early so a typo'd URL never burns a launch
    github::parse_pr_url(pr_url)?;

    let args = LaunchArgs {
        pr_url: Some(pr_url.to_string()),
        prompt: format!(
            "Review the pull request at {pr_url}. Read the diff carefully, \
             point out bugs, risky changes, and missing tests, and summarize \
             your findings as review comments."
        ),
        model,
        ..LaunchArgs::default()
    };
    launch(store, service, args)
}

// --- agents ---

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        AgentSummary {
            id: agent.id.clone(),
            name: agent.name.clone(),
            status: agent.status.label().to_string(),
            repository: agent.source.repository.clone(),
            pr_url: agent.target.pr_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentListResult {
    pub agents: Vec<AgentSummary>,
}

impl Output for AgentListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.agents.is_empty() {
            return "No agents.".to_string();
        }
        self.agents
            .iter()
            .map(|a| {
                format!(
                    "{:<12} {:<10} {}",
                    a.id,
                    a.status,
                    a.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn agent_list(service: &dyn AgentService) -> Result<AgentListResult> {
    let agents = service.list()?;
    Ok(AgentListResult {
        agents: agents.iter().map(AgentSummary::from).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct AgentShowResult {
    #[serde(flatten)]
    pub agent: Agent,
}

impl Output for AgentShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let a = &self.agent;
        let mut out = format!("{} ({})\n  status: {}", a.name, a.id, a.status.label());
        if let Some(repo) = &a.source.repository {
            out.push_str(&format!("\n  repo:   {repo}"));
        }
        if let Some(branch) = &a.target.branch_name {
            out.push_str(&format!("\n  branch: {branch}"));
        }
        if let Some(pr) = &a.target.pr_url {
            out.push_str(&format!("\n  pr:     {pr}"));
        }
        if let (Some(add), Some(del)) = (a.lines_added, a.lines_removed) {
            out.push_str(&format!("\n  diff:   +{add} -{del}"));
        }
        if let Some(summary) = &a.summary {
            out.push_str(&format!("\n  {summary}"));
        }
        out
    }
}

pub fn agent_show(service: &dyn AgentService, id: &str) -> Result<AgentShowResult> {
    Ok(AgentShowResult {
        agent: service.get(id)?,
    })
}

#[derive(Debug, Serialize)]
pub struct AckResult {
    pub id: String,
    pub action: String,
}

impl Output for AckResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("{} {}", self.action, self.id)
    }
}

pub fn agent_stop(service: &dyn AgentService, id: &str) -> Result<AckResult> {
    service.stop(id)?;
    Ok(AckResult {
        id: id.to_string(),
        action: "stopped".to_string(),
    })
}

/// Delete an agent: drop its pane and, unless it was a never-confirmed
/// placeholder, delete it on the service too.
pub fn agent_delete(store: Store, service: &dyn AgentService, id: &str) -> Result<AckResult> {
    let mut engine = GridEngine::new(store);
    let needs_remote = engine.delete(id)?;
    if needs_remote {
        service.delete(id)?;
    }
    Ok(AckResult {
        id: id.to_string(),
        action: "deleted".to_string(),
    })
}

/// Send a follow-up prompt; a matching stored draft is cleared on success.
pub fn follow_up(
    store: &Store,
    service: &dyn AgentService,
    id: &str,
    text: &str,
    images: Vec<PromptImage>,
) -> Result<AckResult> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput("message must not be empty".to_string()));
    }
    service.follow_up(
        id,
        &FollowUpRequest {
            prompt: Prompt {
                text: text.to_string(),
                images,
            },
        },
    )?;
    if store.draft(id) == text {
        store.set_draft(id, "")?;
    }
    Ok(AckResult {
        id: id.to_string(),
        action: "sent follow-up to".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ConversationResult {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
}

impl Output for ConversationResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.messages.is_empty() {
            return "No messages.".to_string();
        }
        self.messages
            .iter()
            .map(|m| {
                let who = match m.kind {
                    crate::models::MessageKind::UserMessage => "you",
                    crate::models::MessageKind::AssistantMessage => "agent",
                };
                format!("[{who}] {}", m.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn conversation(service: &dyn AgentService, id: &str) -> Result<ConversationResult> {
    Ok(ConversationResult {
        id: id.to_string(),
        messages: service.conversation(id)?,
    })
}

#[derive(Debug, Serialize)]
pub struct ModelsResult {
    pub models: Vec<String>,
}

impl Output for ModelsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.models.is_empty() {
            return "No models.".to_string();
        }
        self.models.join("\n")
    }
}

/// Models available for launches.
pub fn models(service: &dyn AgentService) -> Result<ModelsResult> {
    Ok(ModelsResult {
        models: service.models()?,
    })
}

// --- grid ---

#[derive(Debug, Serialize)]
pub struct GridResult {
    pub items: Vec<GridItem>,
}

impl Output for GridResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.items.is_empty() {
            return "Grid is empty.".to_string();
        }
        self.items
            .iter()
            .map(|i| format!("{:>3}  {}", i.order, i.agent_id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn grid_show(store: &Store) -> Result<GridResult> {
    let mut items = store.grid();
    items.sort_by(|a, b| a.order.cmp(&b.order).then(a.agent_id.cmp(&b.agent_id)));
    Ok(GridResult { items })
}

pub fn grid_add(store: Store, agent_id: &str) -> Result<GridResult> {
    let mut engine = GridEngine::new(store);
    if !engine.add_existing(agent_id)? {
        return Err(Error::InvalidInput(format!(
            "agent {agent_id} is already in the grid"
        )));
    }
    grid_show(engine.store())
}

pub fn grid_rm(store: Store, agent_id: &str) -> Result<GridResult> {
    let mut engine = GridEngine::new(store);
    if !engine.store().grid().iter().any(|g| g.agent_id == agent_id) {
        return Err(Error::NotFound(format!("agent {agent_id} is not in the grid")));
    }
    engine.remove(agent_id)?;
    grid_show(engine.store())
}

// --- repositories and branches ---

#[derive(Debug, Serialize)]
pub struct ReposResult {
    pub repositories: Vec<Repository>,
    /// Whether this response came from the local cache.
    pub cached: bool,
}

impl Output for ReposResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.repositories.is_empty() {
            return "No repositories.".to_string();
        }
        let mut lines: Vec<String> = self
            .repositories
            .iter()
            .map(|r| format!("{}/{}", r.owner, r.name))
            .collect();
        if self.cached {
            lines.push("(cached)".to_string());
        }
        lines.join("\n")
    }
}

/// List repositories with stale-while-revalidate caching. `refresh` forces
/// a network fetch; a fresh cache hit otherwise skips the network entirely.
pub fn repos(store: &Store, service: &dyn AgentService, refresh: bool) -> Result<ReposResult> {
    let api_key = require_api_key(store)?;
    let account = Store::account_key(&api_key);

    if !refresh {
        if let CacheRead::Fresh(repositories) = cache::read_repos(store, &api_key) {
            return Ok(ReposResult {
                repositories,
                cached: true,
            });
        }
    }

    match service.repositories() {
        Ok(repositories) => {
            store.set_cached_repos(&account, &repositories)?;
            Ok(ReposResult {
                repositories,
                cached: false,
            })
        }
        // Network down: a stale cache still beats an error
        Err(e) => match store.repos_from_cache(&account) {
            Some(repositories) => Ok(ReposResult {
                repositories,
                cached: true,
            }),
            None => Err(e.into()),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct BranchesResult {
    pub repository: String,
    pub branches: Vec<String>,
    pub cached: bool,
}

impl Output for BranchesResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.branches.is_empty() {
            return "No branches.".to_string();
        }
        self.branches.join("\n")
    }
}

/// List branches of a repository, cached per URL for 10 minutes.
pub fn branches(store: &Store, repo_url: &str, refresh: bool) -> Result<BranchesResult> {
    let token = require_github_token(store)?;

    if !refresh {
        if let CacheRead::Fresh(branches) = cache::read_branches(store, repo_url) {
            return Ok(BranchesResult {
                repository: repo_url.to_string(),
                branches,
                cached: true,
            });
        }
    }

    match github::branches(&token, repo_url) {
        Ok(branches) => {
            store.set_cached_branches(repo_url, &branches)?;
            Ok(BranchesResult {
                repository: repo_url.to_string(),
                branches,
                cached: false,
            })
        }
        Err(e) => match store.branches_from_cache(repo_url) {
            Some(branches) => Ok(BranchesResult {
                repository: repo_url.to_string(),
                branches,
                cached: true,
            }),
            None => Err(e.into()),
        },
    }
}

// --- pull requests ---

#[derive(Debug, Serialize)]
pub struct PrStatusResult {
    pub url: String,
    pub status: crate::models::PrStatus,
}

impl Output for PrStatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let label = match self.status {
            crate::models::PrStatus::Open => "open",
            crate::models::PrStatus::Draft => "draft",
            crate::models::PrStatus::Merged => "merged",
            crate::models::PrStatus::Closed => "closed",
        };
        format!("{} - {label}", self.url)
    }
}

pub fn pr_status(store: &Store, url: &str) -> Result<PrStatusResult> {
    let token = require_github_token(store)?;
    Ok(PrStatusResult {
        url: url.to_string(),
        status: github::pr_status(&token, url)?,
    })
}

#[derive(Debug, Serialize)]
pub struct PrMergeResult {
    pub url: String,
    pub merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl Output for PrMergeResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.merged {
            format!("Merged {}", self.url)
        } else {
            format!("Merge failed for {}", self.url)
        }
    }
}

pub fn pr_merge(store: &Store, url: &str, method: Option<&str>) -> Result<PrMergeResult> {
    let token = require_github_token(store)?;
    let result = github::merge_pr(&token, url, method)?;
    Ok(PrMergeResult {
        url: url.to_string(),
        merged: result.merged,
        sha: result.sha,
    })
}

#[derive(Debug, Serialize)]
pub struct PrReviewersResult {
    pub url: String,
    pub reviewers: Vec<String>,
}

impl Output for PrReviewersResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Requested review from {} on {}", self.reviewers.join(", "), self.url)
    }
}

pub fn pr_reviewers(store: &Store, url: &str, reviewers: Vec<String>) -> Result<PrReviewersResult> {
    if reviewers.is_empty() {
        return Err(Error::InvalidInput("no reviewers given".to_string()));
    }
    let token = require_github_token(store)?;
    github::request_reviewers(&token, url, &reviewers)?;
    Ok(PrReviewersResult {
        url: url.to_string(),
        reviewers,
    })
}

#[derive(Debug, Serialize)]
pub struct ReviewsResult {
    pub requests: Vec<ReviewRequest>,
}

impl Output for ReviewsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.requests.is_empty() {
            return "No reviews requested.".to_string();
        }
        self.requests
            .iter()
            .map(|r| format!("{} #{} {} (by {})", r.repo, r.number, r.title, r.author))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Open PRs waiting on the authenticated user's review.
pub fn reviews(store: &Store) -> Result<ReviewsResult> {
    let token = require_github_token(store)?;
    Ok(ReviewsResult {
        requests: github::review_requests(&token)?,
    })
}

// --- drafts ---

#[derive(Debug, Serialize)]
pub struct DraftResult {
    pub agent_id: String,
    pub text: String,
}

impl Output for DraftResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.text.is_empty() {
            format!("No draft for {}", self.agent_id)
        } else {
            self.text.clone()
        }
    }
}

pub fn draft_get(store: &Store, agent_id: &str) -> Result<DraftResult> {
    Ok(DraftResult {
        agent_id: agent_id.to_string(),
        text: store.draft(agent_id),
    })
}

pub fn draft_set(store: &Store, agent_id: &str, text: &str) -> Result<DraftResult> {
    store.set_draft(agent_id, text)?;
    Ok(DraftResult {
        agent_id: agent_id.to_string(),
        text: text.to_string(),
    })
}

// --- config ---

/// Redact a secret down to its last four characters. Counted in chars, so
/// multi-byte secrets never split a boundary.
fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

impl Output for ConfigResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match &self.api_key {
            Some(k) => lines.push(format!("api-key:      {k}")),
            None => lines.push("api-key:      (not set)".to_string()),
        }
        match &self.github_token {
            Some(t) => lines.push(format!("github-token: {t}")),
            None => lines.push("github-token: (not set)".to_string()),
        }
        lines.join("\n")
    }
}

/// Known config keys for `dh config set/clear`.
pub enum ConfigKey {
    ApiKey,
    GithubToken,
}

impl ConfigKey {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "api-key" => Ok(ConfigKey::ApiKey),
            "github-token" => Ok(ConfigKey::GithubToken),
            other => Err(Error::InvalidInput(format!(
                "unknown config key '{other}' (expected api-key or github-token)"
            ))),
        }
    }
}

pub fn config_set(store: &Store, key: ConfigKey, value: &str) -> Result<ConfigResult> {
    if value.is_empty() {
        return Err(Error::InvalidInput("value must not be empty".to_string()));
    }
    match key {
        ConfigKey::ApiKey => store.set_api_key(value)?,
        ConfigKey::GithubToken => store.set_github_token(value)?,
    }
    config_get(store)
}

pub fn config_clear(store: &Store, key: ConfigKey) -> Result<ConfigResult> {
    match key {
        ConfigKey::ApiKey => store.clear_api_key()?,
        ConfigKey::GithubToken => store.clear_github_token()?,
    }
    config_get(store)
}

/// Show configured credentials, redacted.
pub fn config_get(store: &Store) -> Result<ConfigResult> {
    Ok(ConfigResult {
        api_key: store.api_key().map(|k| redact(&k)),
        github_token: store.github_token().map(|t| redact(&t)),
    })
}

#[derive(Debug, Serialize)]
pub struct ConfigTestResult {
    pub api_key_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_name: Option<String>,
    pub github_token_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_login: Option<String>,
}

impl Output for ConfigTestResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.api_key_valid {
            lines.push(format!(
                "api-key:      ok ({})",
                self.api_key_name.as_deref().unwrap_or("unnamed")
            ));
        } else {
            lines.push("api-key:      invalid or not set".to_string());
        }
        if self.github_token_valid {
            lines.push(format!(
                "github-token: ok ({})",
                self.github_login.as_deref().unwrap_or("unknown")
            ));
        } else {
            lines.push("github-token: invalid or not set".to_string());
        }
        lines.join("\n")
    }
}

/// Probe both credentials against their services.
pub fn config_test(store: &Store, service: &dyn AgentService) -> Result<ConfigTestResult> {
    let (api_key_valid, api_key_name) = if store.api_key().is_some() {
        match service.me() {
            Ok(me) => (true, Some(me.api_key_name)),
            Err(_) => (false, None),
        }
    } else {
        (false, None)
    };

    let (github_token_valid, github_login) = match store.github_token() {
        Some(token) => match github::validate_token(&token) {
            Ok(user) => (true, Some(user.login)),
            Err(_) => (false, None),
        },
        None => (false, None),
    };

    Ok(ConfigTestResult {
        api_key_valid,
        api_key_name,
        github_token_valid,
        github_login,
    })
}
