//! Data model for Deckhand.
//!
//! Wire types mirror the hosted agent service's JSON (camelCase fields,
//! SCREAMING_SNAKE statuses); local types (`GridItem`, `PendingLaunch`)
//! belong to the dashboard itself and never travel over the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote-owned lifecycle state of an agent job.
///
/// A pending local launch may synthesize `Creating` (call in flight) or
/// `Error` (call rejected) before a remote id exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Creating,
    Running,
    Finished,
    Stopped,
    Error,
}

impl AgentStatus {
    /// Whether the agent is still doing work (fast-poll cadence applies).
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Creating | AgentStatus::Running)
    }

    /// Whether the agent has reached a terminal state (polling stops).
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Short lowercase label for display.
    pub fn label(&self) -> &'static str {
        match self {
            AgentStatus::Creating => "creating",
            AgentStatus::Running => "running",
            AgentStatus::Finished => "finished",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        }
    }
}

/// Where an agent's work starts from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSource {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
}

/// Where an agent's work lands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTarget {
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub auto_create_pr: bool,
    #[serde(default)]
    pub auto_branch: Option<bool>,
}

/// One remote coding-agent job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub source: AgentSource,
    #[serde(default)]
    pub target: AgentTarget,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lines_added: Option<u64>,
    #[serde(default)]
    pub lines_removed: Option<u64>,
    #[serde(default)]
    pub files_changed: Option<u64>,
}

impl Agent {
    /// Synthesize a placeholder agent for a launch that has not been
    /// confirmed by the service yet. Status is `Creating` until the create
    /// call fails, then `Error`.
    pub fn placeholder(id: &str, pending: &PendingLaunch, source: AgentSource) -> Self {
        Agent {
            id: id.to_string(),
            name: pending.label.clone(),
            status: if pending.error.is_some() {
                AgentStatus::Error
            } else {
                AgentStatus::Creating
            },
            source,
            target: AgentTarget::default(),
            summary: pending.error.clone(),
            created_at: None,
            lines_added: None,
            lines_removed: None,
            files_changed: None,
        }
    }
}

/// Prompt payload for launch and follow-up requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PromptImage>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Prompt {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// Base64 image attachment for a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptImage {
    pub data: String,
    pub dimension: ImageDimension,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDimension {
    pub width: u32,
    pub height: u32,
}

/// Request body for launching a new agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub prompt: Prompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub source: AgentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AgentTarget>,
}

impl LaunchRequest {
    /// Human-readable label for the pane while the launch is unconfirmed:
    /// the repository, the PR under review, or a generic fallback.
    pub fn label(&self) -> String {
        if let Some(repo) = &self.source.repository {
            repo.trim_start_matches("https://github.com/").to_string()
        } else if let Some(pr) = &self.source.pr_url {
            format!("review {pr}")
        } else {
            "new agent".to_string()
        }
    }
}

/// Request body for a follow-up message to a running agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpRequest {
    pub prompt: Prompt,
}

/// One message in an agent's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    AssistantMessage,
}

/// A repository the agent service can work against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    /// Full repository URL, as the launch API expects it.
    pub repository: String,
}

/// One pane slot in the dashboard grid: an agent id and its sort position.
///
/// Agent ids are unique within the grid. `order` defines the user-visible
/// sequence; new items append at `max(order) + 1` and removal never
/// renumbers survivors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridItem {
    pub agent_id: String,
    pub order: i64,
}

/// In-memory record of a launch whose create call has not resolved.
///
/// Exists from the moment the user hits launch until the call succeeds
/// (entry removed, grid rewritten to the real id) or the user removes the
/// pane. A failed call keeps the entry, annotated with the error.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLaunch {
    pub label: String,
    pub prompt: String,
    pub error: Option<String>,
}

/// Pull request state as classified from the GitHub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Draft,
    Merged,
    Closed,
}

/// One PR from the review-requested search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub title: String,
    pub url: String,
    pub number: u64,
    pub repo: String,
    pub author: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_status_wire_format_is_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Creating).unwrap(),
            "\"CREATING\""
        );
        let parsed: AgentStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, AgentStatus::Running);
    }

    #[test]
    fn agent_status_liveness() {
        assert!(AgentStatus::Creating.is_active());
        assert!(AgentStatus::Running.is_active());
        assert!(AgentStatus::Finished.is_terminal());
        assert!(AgentStatus::Stopped.is_terminal());
        assert!(AgentStatus::Error.is_terminal());
    }

    #[test]
    fn agent_deserializes_from_service_json() {
        let json = r#"{
            "id": "ag_123",
            "name": "Fix login bug",
            "status": "RUNNING",
            "source": { "repository": "https://github.com/acme/web", "ref": "main" },
            "target": { "branchName": "agent/fix-login", "autoCreatePr": true },
            "createdAt": "2026-08-01T12:00:00Z",
            "linesAdded": 42
        }"#;

        let agent: Agent = serde_json::from_str(json).unwrap();
        assert_eq!(agent.id, "ag_123");
        assert_eq!(agent.status, AgentStatus::Running);
        assert_eq!(
            agent.source.repository.as_deref(),
            Some("https://github.com/acme/web")
        );
        assert_eq!(agent.source.git_ref.as_deref(), Some("main"));
        assert_eq!(agent.target.branch_name.as_deref(), Some("agent/fix-login"));
        assert!(agent.target.auto_create_pr);
        assert_eq!(agent.lines_added, Some(42));
        assert!(agent.summary.is_none());
    }

    #[test]
    fn launch_request_serializes_camel_case() {
        let req = LaunchRequest {
            prompt: Prompt::text("fix bug"),
            model: Some("gpt-test".to_string()),
            source: AgentSource {
                repository: Some("https://github.com/acme/web".to_string()),
                git_ref: None,
                pr_url: None,
            },
            target: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["prompt"]["text"], "fix bug");
        assert_eq!(json["source"]["repository"], "https://github.com/acme/web");
        // Empty optionals stay off the wire
        assert!(json.get("target").is_none());
        assert!(json["prompt"].get("images").is_none());
    }

    #[test]
    fn launch_label_prefers_repository() {
        let mut req = LaunchRequest {
            prompt: Prompt::text("x"),
            ..Default::default()
        };
        req.source.repository = Some("https://github.com/acme/web".to_string());
        assert_eq!(req.label(), "acme/web");

        req.source.repository = None;
        req.source.pr_url = Some("https://github.com/acme/web/pull/7".to_string());
        assert_eq!(req.label(), "review https://github.com/acme/web/pull/7");

        req.source.pr_url = None;
        assert_eq!(req.label(), "new agent");
    }

    #[test]
    fn placeholder_reflects_pending_error() {
        let mut pending = PendingLaunch {
            label: "acme/web".to_string(),
            prompt: "fix bug".to_string(),
            error: None,
        };
        let agent = Agent::placeholder("pending-1", &pending, AgentSource::default());
        assert_eq!(agent.status, AgentStatus::Creating);
        assert_eq!(agent.name, "acme/web");

        pending.error = Some("quota exceeded".to_string());
        let agent = Agent::placeholder("pending-1", &pending, AgentSource::default());
        assert_eq!(agent.status, AgentStatus::Error);
        assert_eq!(agent.summary.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn conversation_message_kind_wire_format() {
        let json = r#"{ "id": "m1", "type": "assistant_message", "text": "done" }"#;
        let msg: ConversationMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::AssistantMessage);
    }
}
