//! Client for the hosted agent service API.
//!
//! All calls are blocking and authenticated with HTTP Basic auth where the
//! API key is the username and the password is empty. The trait exists so
//! the command layer and the TUI can be exercised against a fake service
//! in tests.

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{
    Agent, ConversationMessage, FollowUpRequest, LaunchRequest, Repository,
};

/// Agent service base URL.
const SERVICE_API_BASE: &str = "https://api.cursor.com";

/// Errors from the agent service API.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// API key is invalid or missing (401 Unauthorized)
    #[error("Invalid or expired API key: service returned 401 Unauthorized")]
    Unauthorized,

    /// Service rejected the request with a non-auth status
    #[error("Service returned HTTP {0}: {1}")]
    Status(u16, String),

    /// Network or other HTTP error
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response
    #[error("Failed to parse service response: {0}")]
    Parse(String),
}

/// Response from GET /v0/agents.
#[derive(Debug, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<Agent>,
}

/// Response from GET /v0/agents/{id}/conversation.
#[derive(Debug, Deserialize)]
pub struct ConversationResponse {
    pub messages: Vec<ConversationMessage>,
}

/// Response from GET /v0/me.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub api_key_name: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Response from GET /v0/models.
#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Response from GET /v0/repositories.
#[derive(Debug, Deserialize)]
pub struct RepositoriesResponse {
    pub repositories: Vec<Repository>,
}

/// Operations the dashboard needs from the agent service.
pub trait AgentService {
    /// Launch a new agent. Returns the confirmed agent with its real id.
    fn create(&self, request: &LaunchRequest) -> Result<Agent, ServiceError>;

    /// List all agents visible to this API key.
    fn list(&self) -> Result<Vec<Agent>, ServiceError>;

    /// Fetch one agent's current snapshot.
    fn get(&self, id: &str) -> Result<Agent, ServiceError>;

    /// Fetch an agent's conversation transcript.
    fn conversation(&self, id: &str) -> Result<Vec<ConversationMessage>, ServiceError>;

    /// Send a follow-up prompt to a running agent.
    fn follow_up(&self, id: &str, request: &FollowUpRequest) -> Result<(), ServiceError>;

    /// Ask the service to stop an agent.
    fn stop(&self, id: &str) -> Result<(), ServiceError>;

    /// Delete an agent on the service side.
    fn delete(&self, id: &str) -> Result<(), ServiceError>;

    /// Describe the authenticated API key.
    fn me(&self) -> Result<MeResponse, ServiceError>;

    /// List models available for launches.
    fn models(&self) -> Result<Vec<String>, ServiceError>;

    /// List repositories connected to this account.
    fn repositories(&self) -> Result<Vec<Repository>, ServiceError>;
}

/// Blocking client against the hosted service.
pub struct CloudClient {
    base_url: String,
    api_key: String,
}

impl CloudClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: SERVICE_API_BASE.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Client against a non-default base URL (local mock in tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Basic auth header value: base64 of `<api key>:` with empty password.
    fn auth_header(&self) -> String {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.api_key));
        format!("Basic {encoded}")
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        ureq::request(method, &url)
            .set("Authorization", &self.auth_header())
            .set("Accept", "application/json")
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self.request("GET", path).call();
        parse_response(response)
    }

    fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, ServiceError> {
        let value =
            serde_json::to_value(body).map_err(|e| ServiceError::Parse(e.to_string()))?;
        let response = self.request(method, path).send_json(value);
        parse_response(response)
    }

    fn send_empty(&self, method: &str, path: &str) -> Result<(), ServiceError> {
        let response = self.request(method, path).call();
        match response {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_error(e)),
        }
    }
}

fn parse_response<T: serde::de::DeserializeOwned>(
    response: Result<ureq::Response, ureq::Error>,
) -> Result<T, ServiceError> {
    match response {
        Ok(resp) => resp
            .into_json()
            .map_err(|e| ServiceError::Parse(e.to_string())),
        Err(e) => Err(classify_error(e)),
    }
}

fn classify_error(error: ureq::Error) -> ServiceError {
    match error {
        ureq::Error::Status(401, _) => ServiceError::Unauthorized,
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            ServiceError::Status(code, body)
        }
        e => ServiceError::Http(e.to_string()),
    }
}

impl AgentService for CloudClient {
    fn create(&self, request: &LaunchRequest) -> Result<Agent, ServiceError> {
        self.send_json("POST", "/v0/agents", request)
    }

    fn list(&self) -> Result<Vec<Agent>, ServiceError> {
        let resp: AgentListResponse = self.get_json("/v0/agents?limit=100")?;
        Ok(resp.agents)
    }

    fn get(&self, id: &str) -> Result<Agent, ServiceError> {
        self.get_json(&format!("/v0/agents/{id}"))
    }

    fn conversation(&self, id: &str) -> Result<Vec<ConversationMessage>, ServiceError> {
        let resp: ConversationResponse = self.get_json(&format!("/v0/agents/{id}/conversation"))?;
        Ok(resp.messages)
    }

    fn follow_up(&self, id: &str, request: &FollowUpRequest) -> Result<(), ServiceError> {
        let _: serde_json::Value =
            self.send_json("POST", &format!("/v0/agents/{id}/followup"), request)?;
        Ok(())
    }

    fn stop(&self, id: &str) -> Result<(), ServiceError> {
        self.send_empty("POST", &format!("/v0/agents/{id}/stop"))
    }

    fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.send_empty("DELETE", &format!("/v0/agents/{id}"))
    }

    fn me(&self) -> Result<MeResponse, ServiceError> {
        self.get_json("/v0/me")
    }

    fn models(&self) -> Result<Vec<String>, ServiceError> {
        let resp: ModelsResponse = self.get_json("/v0/models")?;
        Ok(resp.models)
    }

    fn repositories(&self) -> Result<Vec<Repository>, ServiceError> {
        let resp: RepositoriesResponse = self.get_json("/v0/repositories")?;
        Ok(resp.repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_basic_with_empty_password() {
        let client = CloudClient::new("key_abc");
        // base64("key_abc:")
        assert_eq!(client.auth_header(), "Basic a2V5X2FiYzo=");
    }

    #[test]
    fn agent_list_response_deserializes() {
        let json = r#"{
            "agents": [
                {
                    "id": "ag_1",
                    "name": "Fix login",
                    "status": "RUNNING",
                    "source": { "repository": "https://github.com/acme/web" },
                    "target": {}
                }
            ]
        }"#;

        let resp: AgentListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.agents.len(), 1);
        assert_eq!(resp.agents[0].id, "ag_1");
    }

    #[test]
    fn conversation_response_deserializes() {
        let json = r#"{
            "messages": [
                { "id": "m1", "type": "user_message", "text": "fix the bug" },
                { "id": "m2", "type": "assistant_message", "text": "on it" }
            ]
        }"#;

        let resp: ConversationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.messages.len(), 2);
        assert_eq!(resp.messages[1].text, "on it");
    }

    #[test]
    fn me_response_deserializes() {
        let json = r#"{ "apiKeyName": "laptop", "userEmail": "dev@example.com" }"#;
        let resp: MeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.api_key_name, "laptop");
        assert_eq!(resp.user_email.as_deref(), Some("dev@example.com"));
    }

    #[test]
    fn repositories_response_deserializes() {
        let json = r#"{
            "repositories": [
                { "owner": "acme", "name": "web", "repository": "https://github.com/acme/web" }
            ]
        }"#;
        let resp: RepositoriesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.repositories[0].owner, "acme");
    }

    #[test]
    fn models_response_deserializes() {
        let json = r#"{ "models": ["model-a", "model-b"] }"#;
        let resp: ModelsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.models, vec!["model-a", "model-b"]);
    }
}
