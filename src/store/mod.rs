//! Local persistent store for Deckhand.
//!
//! Durable key-value regions under the data directory:
//!
//! - credentials: agent API key and GitHub token (no TTL, secret file mode)
//! - grid: the pane layout, an array of `{agentId, order}`
//! - repository cache: per-account, 1-hour TTL, stale reads allowed
//! - branch cache: per-repository map, 10-minute TTL, stale reads allowed
//! - drafts: per-agent unsent follow-up text
//!
//! Every read tolerates a missing or corrupt region by returning the empty
//! default; stored data can never poison a session. The data directory is
//! `DH_DATA_DIR` when set, else `~/.local/share/deckhand`.

pub mod backend;

pub use backend::{FileBackend, MemoryBackend, StoreBackend};

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{GridItem, Repository};
use crate::{Error, Result};

/// Repository list cache lifetime (1 hour).
pub const REPO_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

/// Per-repository branch cache lifetime (10 minutes).
pub const BRANCH_CACHE_TTL_MS: i64 = 10 * 60 * 1000;

const KEY_API_KEY: &str = "api-key";
const KEY_GITHUB_TOKEN: &str = "github-token";
const KEY_GRID: &str = "grid";
const KEY_BRANCHES: &str = "branches";
const KEY_DRAFTS: &str = "drafts";

#[derive(Debug, Serialize, Deserialize)]
struct RepoCacheEntry {
    repositories: Vec<Repository>,
    ts: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BranchCacheEntry {
    branches: Vec<String>,
    ts: DateTime<Utc>,
}

/// Facade over a [`StoreBackend`] implementing the region policies.
pub struct Store {
    backend: Box<dyn StoreBackend>,
}

/// Resolve the data directory: `DH_DATA_DIR` override, else the XDG data
/// dir. The override is what integration tests use for isolation.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("DH_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join("deckhand"))
        .ok_or_else(|| Error::Other("could not determine data directory".to_string()))
}

impl Store {
    /// Open the store at the default data directory.
    pub fn open() -> Result<Self> {
        Self::with_data_dir(&data_dir()?)
    }

    /// Open the store at an explicit directory (dependency injection for
    /// tests and tools).
    pub fn with_data_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            backend: Box::new(FileBackend::new(dir)?),
        })
    }

    /// An in-memory store that forgets everything on drop.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
        }
    }

    /// Wrap an arbitrary backend.
    pub fn with_backend(backend: Box<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let raw = self.backend.read(key)?;
        serde_json::from_str(&raw).ok()
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.backend.write(key, &serde_json::to_string(value)?)
    }

    // --- credentials ---

    pub fn api_key(&self) -> Option<String> {
        self.read_json(KEY_API_KEY)
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        self.backend
            .write_secret(KEY_API_KEY, &serde_json::to_string(key)?)
    }

    pub fn clear_api_key(&self) -> Result<()> {
        self.backend.remove(KEY_API_KEY)
    }

    pub fn github_token(&self) -> Option<String> {
        self.read_json(KEY_GITHUB_TOKEN)
    }

    pub fn set_github_token(&self, token: &str) -> Result<()> {
        self.backend
            .write_secret(KEY_GITHUB_TOKEN, &serde_json::to_string(token)?)
    }

    pub fn clear_github_token(&self) -> Result<()> {
        self.backend.remove(KEY_GITHUB_TOKEN)
    }

    // --- grid layout ---

    /// The stored grid. Corrupt or missing data reads as empty.
    pub fn grid(&self) -> Vec<GridItem> {
        self.read_json(KEY_GRID).unwrap_or_default()
    }

    pub fn set_grid(&self, items: &[GridItem]) -> Result<()> {
        self.write_json(KEY_GRID, &items)
    }

    /// Append an agent at the next order slot. No-op if already present.
    pub fn add_to_grid(&self, agent_id: &str) -> Result<Vec<GridItem>> {
        let mut grid = self.grid();
        if grid.iter().any(|g| g.agent_id == agent_id) {
            return Ok(grid);
        }
        let next = grid.iter().map(|g| g.order).max().unwrap_or(-1) + 1;
        grid.push(GridItem {
            agent_id: agent_id.to_string(),
            order: next,
        });
        self.set_grid(&grid)?;
        Ok(grid)
    }

    pub fn remove_from_grid(&self, agent_id: &str) -> Result<Vec<GridItem>> {
        let mut grid = self.grid();
        grid.retain(|g| g.agent_id != agent_id);
        self.set_grid(&grid)?;
        Ok(grid)
    }

    /// Rewrite an item's agent id in place, keeping its `order`.
    pub fn replace_in_grid(&self, old_id: &str, new_id: &str) -> Result<Vec<GridItem>> {
        let mut grid = self.grid();
        for item in &mut grid {
            if item.agent_id == old_id {
                item.agent_id = new_id.to_string();
            }
        }
        self.set_grid(&grid)?;
        Ok(grid)
    }

    // --- repository cache (per account) ---

    /// Cache region key for an account. The API key is hashed so it never
    /// appears in a filename.
    pub fn account_key(api_key: &str) -> String {
        let digest = Sha256::digest(api_key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("repos-{}", &hex[..12])
    }

    /// Fresh read: `None` once the entry is older than [`REPO_CACHE_TTL_MS`].
    pub fn cached_repos(&self, account: &str) -> Option<Vec<Repository>> {
        self.cached_repos_at(account, Utc::now())
    }

    pub(crate) fn cached_repos_at(&self, account: &str, now: DateTime<Utc>) -> Option<Vec<Repository>> {
        let entry: RepoCacheEntry = self.read_json(account)?;
        if (now - entry.ts).num_milliseconds() > REPO_CACHE_TTL_MS {
            return None;
        }
        Some(entry.repositories)
    }

    /// Stale read: returns whatever is stored regardless of TTL, for
    /// stale-while-revalidate display.
    pub fn repos_from_cache(&self, account: &str) -> Option<Vec<Repository>> {
        let entry: RepoCacheEntry = self.read_json(account)?;
        Some(entry.repositories)
    }

    pub fn set_cached_repos(&self, account: &str, repos: &[Repository]) -> Result<()> {
        self.set_cached_repos_at(account, repos, Utc::now())
    }

    pub(crate) fn set_cached_repos_at(
        &self,
        account: &str,
        repos: &[Repository],
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.write_json(
            account,
            &RepoCacheEntry {
                repositories: repos.to_vec(),
                ts,
            },
        )
    }

    pub fn clear_cached_repos(&self, account: &str) -> Result<()> {
        self.backend.remove(account)
    }

    // --- branch cache (per repository) ---

    fn branch_map(&self) -> HashMap<String, BranchCacheEntry> {
        self.read_json(KEY_BRANCHES).unwrap_or_default()
    }

    /// Fresh read: `None` once the entry is older than [`BRANCH_CACHE_TTL_MS`].
    pub fn cached_branches(&self, repo_url: &str) -> Option<Vec<String>> {
        self.cached_branches_at(repo_url, Utc::now())
    }

    pub(crate) fn cached_branches_at(&self, repo_url: &str, now: DateTime<Utc>) -> Option<Vec<String>> {
        let entry = self.branch_map().remove(repo_url)?;
        if (now - entry.ts).num_milliseconds() > BRANCH_CACHE_TTL_MS {
            return None;
        }
        Some(entry.branches)
    }

    /// Stale read regardless of TTL.
    pub fn branches_from_cache(&self, repo_url: &str) -> Option<Vec<String>> {
        Some(self.branch_map().remove(repo_url)?.branches)
    }

    pub fn set_cached_branches(&self, repo_url: &str, branches: &[String]) -> Result<()> {
        self.set_cached_branches_at(repo_url, branches, Utc::now())
    }

    pub(crate) fn set_cached_branches_at(
        &self,
        repo_url: &str,
        branches: &[String],
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let mut map = self.branch_map();
        map.insert(
            repo_url.to_string(),
            BranchCacheEntry {
                branches: branches.to_vec(),
                ts,
            },
        );
        self.write_json(KEY_BRANCHES, &map)
    }

    // --- drafts ---

    fn drafts(&self) -> HashMap<String, String> {
        self.read_json(KEY_DRAFTS).unwrap_or_default()
    }

    /// Unsent follow-up text for an agent, empty if none.
    pub fn draft(&self, agent_id: &str) -> String {
        self.drafts().remove(agent_id).unwrap_or_default()
    }

    /// Store draft text; an empty string removes the entry.
    pub fn set_draft(&self, agent_id: &str, text: &str) -> Result<()> {
        let mut drafts = self.drafts();
        if text.is_empty() {
            drafts.remove(agent_id);
        } else {
            drafts.insert(agent_id.to_string(), text.to_string());
        }
        self.write_json(KEY_DRAFTS, &drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn repo(owner: &str, name: &str) -> Repository {
        Repository {
            owner: owner.to_string(),
            name: name.to_string(),
            repository: format!("https://github.com/{owner}/{name}"),
        }
    }

    #[test]
    fn grid_add_is_idempotent_and_appends_at_max_plus_one() {
        let store = Store::in_memory();
        store.add_to_grid("a").unwrap();
        store.add_to_grid("b").unwrap();
        store.add_to_grid("a").unwrap();

        let grid = store.grid();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].order, 0);
        assert_eq!(grid[1].order, 1);
    }

    #[test]
    fn grid_orders_are_not_compacted_on_remove() {
        let store = Store::in_memory();
        store.add_to_grid("a").unwrap();
        store.add_to_grid("b").unwrap();
        store.add_to_grid("c").unwrap();
        store.remove_from_grid("b").unwrap();
        store.add_to_grid("d").unwrap();

        let grid = store.grid();
        let orders: Vec<i64> = grid.iter().map(|g| g.order).collect();
        // "c" keeps order 2, "d" appends after it
        assert_eq!(orders, vec![0, 2, 3]);
    }

    #[test]
    fn replace_in_grid_preserves_order() {
        let store = Store::in_memory();
        store.add_to_grid("a").unwrap();
        store.add_to_grid("pending-1").unwrap();
        store.add_to_grid("c").unwrap();

        let before: Vec<i64> = store.grid().iter().map(|g| g.order).collect();
        store.replace_in_grid("pending-1", "ag_42").unwrap();
        let grid = store.grid();
        let after: Vec<i64> = grid.iter().map(|g| g.order).collect();

        assert_eq!(before, after);
        assert_eq!(grid[1].agent_id, "ag_42");
        assert_eq!(grid[1].order, 1);
    }

    #[test]
    fn corrupt_grid_reads_as_empty() {
        let store = Store::in_memory();
        store.backend.write("grid", "{not json").unwrap();
        assert!(store.grid().is_empty());
    }

    #[test]
    fn corrupt_drafts_read_as_empty() {
        let store = Store::in_memory();
        store.backend.write("drafts", "42").unwrap();
        assert_eq!(store.draft("a"), "");
        // Writing after corruption starts from a clean map
        store.set_draft("a", "hello").unwrap();
        assert_eq!(store.draft("a"), "hello");
    }

    #[test]
    fn repo_cache_honors_ttl() {
        let store = Store::in_memory();
        let account = Store::account_key("k-123");
        let repos = vec![repo("acme", "web")];
        let now = Utc::now();

        store.set_cached_repos_at(&account, &repos, now).unwrap();
        assert_eq!(store.cached_repos_at(&account, now), Some(repos.clone()));

        // Just inside the TTL
        let later = now + Duration::milliseconds(REPO_CACHE_TTL_MS - 1000);
        assert!(store.cached_repos_at(&account, later).is_some());

        // Past the TTL: fresh read misses, stale read still serves
        let expired = now + Duration::milliseconds(REPO_CACHE_TTL_MS + 1000);
        assert!(store.cached_repos_at(&account, expired).is_none());
        assert_eq!(store.repos_from_cache(&account), Some(repos));
    }

    #[test]
    fn repo_cache_is_per_account() {
        let store = Store::in_memory();
        let a = Store::account_key("key-a");
        let b = Store::account_key("key-b");
        assert_ne!(a, b);

        store.set_cached_repos(&a, &[repo("acme", "web")]).unwrap();
        assert!(store.cached_repos(&a).is_some());
        assert!(store.cached_repos(&b).is_none());

        store.clear_cached_repos(&a).unwrap();
        assert!(store.repos_from_cache(&a).is_none());
    }

    #[test]
    fn branch_cache_honors_ttl_per_repo() {
        let store = Store::in_memory();
        let url = "https://github.com/acme/web";
        let branches = vec!["main".to_string(), "dev".to_string()];
        let now = Utc::now();

        store.set_cached_branches_at(url, &branches, now).unwrap();
        assert_eq!(store.cached_branches_at(url, now), Some(branches.clone()));
        assert!(store.cached_branches("https://github.com/acme/api").is_none());

        let expired = now + Duration::milliseconds(BRANCH_CACHE_TTL_MS + 1000);
        assert!(store.cached_branches_at(url, expired).is_none());
        assert_eq!(store.branches_from_cache(url), Some(branches));
    }

    #[test]
    fn drafts_remove_when_emptied() {
        let store = Store::in_memory();
        store.set_draft("ag_1", "half-typed message").unwrap();
        assert_eq!(store.draft("ag_1"), "half-typed message");

        store.set_draft("ag_1", "").unwrap();
        assert_eq!(store.draft("ag_1"), "");
        assert!(store.drafts().is_empty());
    }

    #[test]
    fn credentials_round_trip_and_clear() {
        let store = Store::in_memory();
        assert!(store.api_key().is_none());

        store.set_api_key("key_secret").unwrap();
        store.set_github_token("ghp_secret").unwrap();
        assert_eq!(store.api_key().as_deref(), Some("key_secret"));
        assert_eq!(store.github_token().as_deref(), Some("ghp_secret"));

        store.clear_api_key().unwrap();
        assert!(store.api_key().is_none());
        assert_eq!(store.github_token().as_deref(), Some("ghp_secret"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = Store::with_data_dir(dir.path()).unwrap();
            store.add_to_grid("ag_1").unwrap();
            store.set_draft("ag_1", "wip").unwrap();
        }
        let store = Store::with_data_dir(dir.path()).unwrap();
        assert_eq!(store.grid().len(), 1);
        assert_eq!(store.draft("ag_1"), "wip");
    }
}
