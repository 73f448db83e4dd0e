//! Deckhand - a terminal dashboard for remote coding agents.
//!
//! This library provides the core functionality for the `dh` CLI tool:
//! an optimistic grid of agent panes, a local persistent store with
//! TTL-backed caches, and thin clients for the hosted agent service and
//! the GitHub API.

pub mod agent_service;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod github;
pub mod grid;
pub mod models;
pub mod store;
#[cfg(feature = "tui")]
pub mod tui;

/// Library-level error type for Deckhand operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not configured: run `dh config set api-key <key>` first")]
    NotConfigured,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent service error: {0}")]
    Service(String),

    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("{0}")]
    Other(String),
}

impl From<agent_service::ServiceError> for Error {
    fn from(e: agent_service::ServiceError) -> Self {
        Error::Service(e.to_string())
    }
}

impl From<github::GitHubError> for Error {
    fn from(e: github::GitHubError) -> Self {
        Error::GitHub(e.to_string())
    }
}

/// Result type alias for Deckhand operations.
pub type Result<T> = std::result::Result<T, Error>;
