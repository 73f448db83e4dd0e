//! Data-fetching policy: poll cadences, in-flight deduplication, and
//! stale-while-revalidate reads over the local store.
//!
//! Polling is an explicit subscription object with `start`/`stop`, owned by
//! whoever drives the event loop; nothing here is tied to a rendering
//! framework. The cadences:
//!
//! - agent list: fixed 15s, always revalidates
//! - single agent / conversation: 2s while CREATING or RUNNING, disabled
//!   once terminal
//! - PR status: fixed 60s, deduplicated per PR URL
//! - review-requested search: fixed 120s

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::AgentStatus;
use crate::store::Store;

/// Fixed cadence for the agent list.
pub const AGENT_LIST_POLL: Duration = Duration::from_secs(15);

/// Cadence for a live agent's detail and conversation.
pub const ACTIVE_AGENT_POLL: Duration = Duration::from_secs(2);

/// Cadence for PR status lookups.
pub const PR_STATUS_POLL: Duration = Duration::from_secs(60);

/// Cadence for the review-requested search.
pub const REVIEW_REQUESTS_POLL: Duration = Duration::from_secs(120);

/// Dynamic cadence for a single agent (or its conversation): fast while the
/// job is live, off once terminal. An unknown status (detail not fetched
/// yet) polls fast so the first snapshot arrives promptly.
pub fn agent_poll_interval(status: Option<AgentStatus>) -> Option<Duration> {
    match status {
        None => Some(ACTIVE_AGENT_POLL),
        Some(s) if s.is_active() => Some(ACTIVE_AGENT_POLL),
        Some(_) => None,
    }
}

/// A start/stoppable poll subscription for one resource key.
#[derive(Debug)]
pub struct Subscription {
    interval: Duration,
    last: Option<Instant>,
    running: bool,
}

impl Subscription {
    /// Create a stopped subscription with the given cadence.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Swap in a new cadence (dynamic-interval policy). `None` stops the
    /// subscription; `Some` keeps the last-fired time so a cadence change
    /// does not trigger an immediate poll.
    pub fn set_interval(&mut self, interval: Option<Duration>) {
        match interval {
            Some(d) => {
                self.interval = d;
                self.running = true;
            }
            None => self.running = false,
        }
    }

    /// Whether a poll should fire now. A running subscription that never
    /// fired is always due.
    pub fn due(&self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    /// Record that a poll fired.
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Forget the last fire so the next check polls immediately. Used when
    /// a mutation invalidates this subscription's data.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// In-flight request registry: concurrent requests for the same key
/// collapse into one.
#[derive(Debug, Default)]
pub struct Inflight {
    keys: HashSet<String>,
}

impl Inflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key. Returns `false` when a request for it is already in
    /// flight, in which case the caller must not issue another.
    pub fn begin(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    /// Release a key once its request resolved (success or failure).
    pub fn finish(&mut self, key: &str) {
        self.keys.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Result of a cache consultation for a slow-changing list.
///
/// `Stale` carries a usable value: the UI shows it immediately and triggers
/// a background refresh. A loading state is only ever justified on `Miss`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead<T> {
    Fresh(T),
    Stale(T),
    Miss,
}

impl<T> CacheRead<T> {
    /// The displayable value, fresh or stale.
    pub fn value(self) -> Option<T> {
        match self {
            CacheRead::Fresh(v) | CacheRead::Stale(v) => Some(v),
            CacheRead::Miss => None,
        }
    }

    /// Whether a network fetch should be issued.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, CacheRead::Fresh(_))
    }
}

/// Consult the per-account repository cache.
pub fn read_repos(store: &Store, api_key: &str) -> CacheRead<Vec<crate::models::Repository>> {
    let account = Store::account_key(api_key);
    let now = Utc::now();
    if let Some(fresh) = store.cached_repos_at(&account, now) {
        return CacheRead::Fresh(fresh);
    }
    match store.repos_from_cache(&account) {
        Some(stale) => CacheRead::Stale(stale),
        None => CacheRead::Miss,
    }
}

/// Consult the per-repository branch cache.
pub fn read_branches(store: &Store, repo_url: &str) -> CacheRead<Vec<String>> {
    let now = Utc::now();
    if let Some(fresh) = store.cached_branches_at(repo_url, now) {
        return CacheRead::Fresh(fresh);
    }
    match store.branches_from_cache(repo_url) {
        Some(stale) => CacheRead::Stale(stale),
        None => CacheRead::Miss,
    }
}

/// Identity of a pollable resource, for invalidation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollKey {
    AgentList,
    Agent(String),
    Conversation(String),
    PrStatus(String),
    ReviewRequests,
}

/// A completed remote mutation, mapped to the cache entries it staled.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Launch,
    FollowUp(String),
    Stop(String),
    Delete(String),
    Merge(String),
}

impl Mutation {
    /// The keys that must refresh so the UI reflects this mutation without
    /// waiting for the next scheduled poll tick.
    pub fn invalidates(&self) -> Vec<PollKey> {
        match self {
            Mutation::Launch => vec![PollKey::AgentList],
            Mutation::FollowUp(id) => vec![
                PollKey::Agent(id.clone()),
                PollKey::Conversation(id.clone()),
            ],
            Mutation::Stop(id) | Mutation::Delete(id) => {
                vec![PollKey::Agent(id.clone()), PollKey::AgentList]
            }
            // A merged PR also drops out of the review-requested queue
            Mutation::Merge(pr_url) => vec![
                PollKey::PrStatus(pr_url.clone()),
                PollKey::ReviewRequests,
            ],
        }
    }
}
