//! CLI argument definitions for Deckhand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Deckhand - a dashboard for remote coding agents.
///
/// Launch agents against your repositories, keep them arranged in a
/// persistent grid, and drive the PRs they open, from the terminal.
#[derive(Parser, Debug)]
#[command(name = "dh")]
#[command(author, version, about = "A dashboard for remote coding agents", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch a new agent and add it to the grid
    Launch {
        /// Prompt text for the agent
        prompt: String,

        /// Repository URL (https://github.com/owner/name)
        #[arg(short, long)]
        repo: Option<String>,

        /// Git ref to start from
        #[arg(long = "ref")]
        git_ref: Option<String>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Target branch name for the agent's work
        #[arg(short, long)]
        branch: Option<String>,

        /// Open a PR automatically when the agent finishes
        #[arg(long)]
        auto_pr: bool,

        /// Attach a PNG image to the prompt (repeatable)
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },

    /// Launch an agent that reviews a pull request
    Review {
        /// Pull request URL
        pr_url: String,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Agent operations
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// Grid layout operations
    Grid {
        #[command(subcommand)]
        command: GridCommands,
    },

    /// List repositories connected to the agent service (cached 1h)
    Repos {
        /// Bypass the cache and refetch
        #[arg(long)]
        refresh: bool,
    },

    /// List branches of a repository (cached 10m)
    Branches {
        /// Repository URL (https://github.com/owner/name)
        repo: String,

        /// Bypass the cache and refetch
        #[arg(long)]
        refresh: bool,
    },

    /// List models available for launches
    Models,

    /// Pull request operations
    Pr {
        #[command(subcommand)]
        command: PrCommands,
    },

    /// Open PRs waiting on your review
    Reviews,

    /// Unsent follow-up drafts
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },

    /// Credential management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Start the interactive dashboard (requires the 'tui' feature)
    #[cfg(feature = "tui")]
    Tui,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// List all agents
    List,

    /// Show one agent's details
    Show {
        /// Agent id
        id: String,
    },

    /// Ask the service to stop an agent
    Stop {
        /// Agent id
        id: String,
    },

    /// Delete an agent (remote and grid)
    Delete {
        /// Agent id
        id: String,
    },

    /// Send a follow-up message to an agent
    FollowUp {
        /// Agent id
        id: String,

        /// Message text
        message: String,

        /// Attach a PNG image to the message (repeatable)
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },

    /// Show an agent's conversation transcript
    Conversation {
        /// Agent id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GridCommands {
    /// Show the grid layout
    Show,

    /// Add an existing agent to the grid
    Add {
        /// Agent id
        id: String,
    },

    /// Remove a pane from the grid (keeps the remote agent)
    Rm {
        /// Agent id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrCommands {
    /// Classify a pull request (open, draft, merged, closed)
    Status {
        /// Pull request URL
        url: String,
    },

    /// Merge a pull request
    Merge {
        /// Pull request URL
        url: String,

        /// Merge method: squash (default), merge, or rebase
        #[arg(short, long)]
        method: Option<String>,
    },

    /// Request reviews on a pull request
    Reviewers {
        /// Pull request URL
        url: String,

        /// GitHub logins to request
        #[arg(required = true)]
        reviewers: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DraftCommands {
    /// Show the stored draft for an agent
    Get {
        /// Agent id
        id: String,
    },

    /// Store a draft for an agent (empty text removes it)
    Set {
        /// Agent id
        id: String,

        /// Draft text
        text: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Store a credential (api-key or github-token)
    Set {
        /// Key name: api-key or github-token
        key: String,

        /// Secret value
        value: String,
    },

    /// Show configured credentials (redacted)
    Get,

    /// Remove a credential
    Clear {
        /// Key name: api-key or github-token
        key: String,
    },

    /// Probe both credentials against their services
    Test,
}
