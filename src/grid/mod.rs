//! Grid reconciliation engine - the dashboard's core state machine.
//!
//! The engine presents a single, stable, ordered list of panes. Each pane
//! resolves to either a confirmed agent from the polled remote list or a
//! synthesized placeholder backed by a pending launch. When a create call
//! resolves, the placeholder's temporary id is swapped for the remote id in
//! place: same order slot, no flicker, no reorder.
//!
//! Per-pane lifecycle:
//!
//! ```text
//! PENDING ──create ok──> CONFIRMED (status owned by the service from here)
//! PENDING ──create err─> PENDING(error)   terminal until user action
//! any     ──remove/delete──> gone
//! ```
//!
//! The engine issues no network calls itself. Callers run the remote create
//! and report back via [`GridEngine::complete_launch`] /
//! [`GridEngine::fail_launch`], which keeps every transition synchronous and
//! testable against an in-memory store.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::Result;
use crate::models::{Agent, AgentSource, GridItem, LaunchRequest, PendingLaunch};
use crate::store::Store;

/// Prefix marking temporary ids of unconfirmed launches.
const TEMP_ID_PREFIX: &str = "pending";

#[derive(Debug, Clone)]
struct PendingEntry {
    launch: PendingLaunch,
    source: AgentSource,
}

/// One renderable pane: the grid slot plus its resolved agent, if any.
///
/// `agent` is `None` for a slot whose id is neither in the remote list nor
/// pending (e.g. the list has not loaded yet); such a stub offers only
/// removal.
#[derive(Debug, Clone)]
pub struct Pane {
    pub item: GridItem,
    pub agent: Option<Agent>,
    /// Set when this pane is an unconfirmed launch.
    pub pending: bool,
    /// Launch error text, when the create call was rejected.
    pub pending_error: Option<String>,
}

/// The reconciliation engine. Owns the injected store, the in-memory
/// pending-launch table, and the focus selection.
pub struct GridEngine {
    store: Store,
    pending: HashMap<String, PendingEntry>,
    focused: Option<String>,
}

/// Generate a session-unique temporary id: millisecond timestamp plus a
/// random suffix. Collisions are prevented by construction, not handled.
fn temp_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{TEMP_ID_PREFIX}-{}-{}",
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

impl GridEngine {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            focused: None,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Start an optimistic launch: insert a placeholder pane at the next
    /// order slot, record the pending launch, and focus it. Returns the
    /// temporary id the caller must resolve with [`Self::complete_launch`]
    /// or [`Self::fail_launch`] once the remote create call finishes.
    pub fn begin_launch(&mut self, request: &LaunchRequest) -> Result<String> {
        let id = temp_id();
        debug_assert!(
            !self.pending.contains_key(&id) && !self.store.grid().iter().any(|g| g.agent_id == id),
            "temporary id collision"
        );

        self.store.add_to_grid(&id)?;
        self.pending.insert(
            id.clone(),
            PendingEntry {
                launch: PendingLaunch {
                    label: request.label(),
                    prompt: request.prompt.text.clone(),
                    error: None,
                },
                source: request.source.clone(),
            },
        );
        self.focused = Some(id.clone());
        Ok(id)
    }

    /// The remote create call succeeded: swap the temporary id for the
    /// remote-assigned one in place. The grid item keeps its order, the
    /// pending entry is cleared, and focus follows the new id only if the
    /// placeholder was still focused.
    ///
    /// A no-op when the pane was removed while the call was in flight: the
    /// remote agent then exists untracked (accepted leak, never
    /// re-surfaced).
    pub fn complete_launch(&mut self, temp_id: &str, agent_id: &str) -> Result<()> {
        if self.pending.remove(temp_id).is_none() {
            return Ok(());
        }
        self.store.replace_in_grid(temp_id, agent_id)?;
        if self.focused.as_deref() == Some(temp_id) {
            self.focused = Some(agent_id.to_string());
        }
        Ok(())
    }

    /// The remote create call failed: keep the placeholder, annotated with
    /// the error, until the user removes it. No automatic retry.
    pub fn fail_launch(&mut self, temp_id: &str, error: impl Into<String>) {
        if let Some(entry) = self.pending.get_mut(temp_id) {
            entry.launch.error = Some(error.into());
        }
    }

    /// Add an already-confirmed agent to the grid. Returns `false` when the
    /// id is already a grid member (nothing changes).
    pub fn add_existing(&mut self, agent_id: &str) -> Result<bool> {
        let grid = self.store.grid();
        if grid.iter().any(|g| g.agent_id == agent_id) {
            return Ok(false);
        }
        self.store.add_to_grid(agent_id)?;
        Ok(true)
    }

    /// Close a pane: drop the grid item and any pending entry. Never calls
    /// the remote service.
    pub fn remove(&mut self, agent_id: &str) -> Result<()> {
        self.store.remove_from_grid(agent_id)?;
        self.pending.remove(agent_id);
        if self.focused.as_deref() == Some(agent_id) {
            self.focused = None;
        }
        Ok(())
    }

    /// Delete an agent: close the pane and report whether the caller must
    /// issue the remote delete. A still-pending placeholder has nothing to
    /// delete remotely, so the answer is `false` for those.
    pub fn delete(&mut self, agent_id: &str) -> Result<bool> {
        let was_pending = self.pending.contains_key(agent_id);
        self.remove(agent_id)?;
        Ok(!was_pending)
    }

    pub fn is_pending(&self, agent_id: &str) -> bool {
        self.pending.contains_key(agent_id)
    }

    pub fn pending_launch(&self, agent_id: &str) -> Option<&PendingLaunch> {
        self.pending.get(agent_id).map(|e| &e.launch)
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn focus(&mut self, agent_id: Option<String>) {
        self.focused = agent_id;
    }

    /// Focus the nth pane (0-based) in order. Out-of-range slots leave the
    /// focus unchanged.
    pub fn focus_slot(&mut self, index: usize) -> Option<String> {
        let mut grid = self.store.grid();
        grid.sort_by(|a, b| a.order.cmp(&b.order).then(a.agent_id.cmp(&b.agent_id)));
        let id = grid.get(index)?.agent_id.clone();
        self.focused = Some(id.clone());
        Some(id)
    }

    /// Build the merged, ordered pane list for rendering.
    ///
    /// The remote list is indexed first; placeholders are overlaid only for
    /// pending ids absent from that index, so a placeholder never shadows a
    /// confirmed agent.
    pub fn panes(&self, remote: &[Agent]) -> Vec<Pane> {
        let mut by_id: HashMap<&str, &Agent> = HashMap::new();
        for agent in remote {
            by_id.insert(agent.id.as_str(), agent);
        }

        let mut grid = self.store.grid();
        grid.sort_by(|a, b| a.order.cmp(&b.order).then(a.agent_id.cmp(&b.agent_id)));

        grid.into_iter()
            .map(|item| {
                if let Some(agent) = by_id.get(item.agent_id.as_str()) {
                    return Pane {
                        item,
                        agent: Some((*agent).clone()),
                        pending: false,
                        pending_error: None,
                    };
                }
                if let Some(entry) = self.pending.get(&item.agent_id) {
                    let agent =
                        Agent::placeholder(&item.agent_id, &entry.launch, entry.source.clone());
                    return Pane {
                        item,
                        agent: Some(agent),
                        pending: true,
                        pending_error: entry.launch.error.clone(),
                    };
                }
                Pane {
                    item,
                    agent: None,
                    pending: false,
                    pending_error: None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStatus, AgentTarget, Prompt};
    use std::collections::HashSet;

    fn engine() -> GridEngine {
        GridEngine::new(Store::in_memory())
    }

    fn request(repo: &str, prompt: &str) -> LaunchRequest {
        LaunchRequest {
            prompt: Prompt::text(prompt),
            model: None,
            source: AgentSource {
                repository: Some(format!("https://github.com/{repo}")),
                git_ref: None,
                pr_url: None,
            },
            target: None,
        }
    }

    fn remote(id: &str, status: AgentStatus) -> Agent {
        Agent {
            id: id.to_string(),
            name: format!("agent {id}"),
            status,
            source: AgentSource::default(),
            target: AgentTarget::default(),
            summary: None,
            created_at: None,
            lines_added: None,
            lines_removed: None,
            files_changed: None,
        }
    }

    #[test]
    fn launch_shows_creating_placeholder_then_swaps_in_place() {
        // Scenario A
        let mut eng = engine();
        let temp = eng.begin_launch(&request("acme/web", "fix bug")).unwrap();

        let panes = eng.panes(&[]);
        assert_eq!(panes.len(), 1);
        let agent = panes[0].agent.as_ref().unwrap();
        assert_eq!(agent.status, AgentStatus::Creating);
        assert_eq!(agent.name, "acme/web");
        assert!(panes[0].pending);
        assert_eq!(eng.focused_id(), Some(temp.as_str()));
        let order_before = panes[0].item.order;

        eng.complete_launch(&temp, "ag_123").unwrap();

        let confirmed = remote("ag_123", AgentStatus::Running);
        let panes = eng.panes(std::slice::from_ref(&confirmed));
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].item.agent_id, "ag_123");
        assert_eq!(panes[0].item.order, order_before);
        assert!(!panes[0].pending);
        assert_eq!(panes[0].agent.as_ref().unwrap().status, AgentStatus::Running);
        assert_eq!(eng.focused_id(), Some("ag_123"));
        assert!(!eng.is_pending(&temp));
    }

    #[test]
    fn order_is_preserved_across_resolution_with_neighbors() {
        let mut eng = engine();
        eng.add_existing("ag_a").unwrap();
        let temp = eng.begin_launch(&request("acme/web", "x")).unwrap();
        eng.add_existing("ag_b").unwrap();

        let orders_before: Vec<(String, i64)> = eng
            .panes(&[])
            .into_iter()
            .map(|p| (p.item.agent_id, p.item.order))
            .collect();
        assert_eq!(orders_before[1].1, 1);

        eng.complete_launch(&temp, "ag_new").unwrap();

        let orders_after: Vec<(String, i64)> = eng
            .panes(&[])
            .into_iter()
            .map(|p| (p.item.agent_id, p.item.order))
            .collect();
        assert_eq!(orders_after[0], ("ag_a".to_string(), 0));
        assert_eq!(orders_after[1], ("ag_new".to_string(), 1));
        assert_eq!(orders_after[2], ("ag_b".to_string(), 2));
    }

    #[test]
    fn remove_before_resolution_orphans_the_create() {
        // Scenario B
        let mut eng = engine();
        let temp = eng.begin_launch(&request("acme/web", "x")).unwrap();
        eng.remove(&temp).unwrap();

        // The create call resolves afterwards
        eng.complete_launch(&temp, "ag_late").unwrap();

        assert!(eng.panes(&[]).is_empty());
        assert!(eng.store().grid().is_empty());
        assert_eq!(eng.focused_id(), None);

        // Even once the orphan shows up in the remote list it stays out of
        // the grid
        let orphan = remote("ag_late", AgentStatus::Running);
        assert!(eng.panes(std::slice::from_ref(&orphan)).is_empty());
    }

    #[test]
    fn failed_launch_keeps_error_pane_and_delete_skips_remote() {
        // Scenario C
        let mut eng = engine();
        let temp = eng.begin_launch(&request("acme/web", "x")).unwrap();
        eng.fail_launch(&temp, "quota exceeded");

        let panes = eng.panes(&[]);
        assert_eq!(panes.len(), 1);
        let agent = panes[0].agent.as_ref().unwrap();
        assert_eq!(agent.status, AgentStatus::Error);
        assert_eq!(panes[0].pending_error.as_deref(), Some("quota exceeded"));

        let remote_delete = eng.delete(&temp).unwrap();
        assert!(!remote_delete);
        assert!(eng.panes(&[]).is_empty());
    }

    #[test]
    fn concurrent_launches_resolve_independently_in_any_order() {
        // Scenario D
        let mut eng = engine();
        let t1 = eng.begin_launch(&request("acme/web", "one")).unwrap();
        let t2 = eng.begin_launch(&request("acme/api", "two")).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(eng.panes(&[]).len(), 2);

        // Resolve out of order
        eng.complete_launch(&t2, "ag_2").unwrap();
        eng.fail_launch(&t1, "boom");

        let panes = eng.panes(&[remote("ag_2", AgentStatus::Running)]);
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].item.agent_id, t1);
        assert_eq!(panes[0].pending_error.as_deref(), Some("boom"));
        assert_eq!(panes[1].item.agent_id, "ag_2");
        assert!(!panes[1].pending);
    }

    #[test]
    fn temp_ids_are_unique_within_a_session() {
        let mut eng = engine();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = eng.begin_launch(&request("acme/web", "x")).unwrap();
            assert!(seen.insert(id));
        }
        assert_eq!(eng.panes(&[]).len(), 100);
    }

    #[test]
    fn launch_resolution_always_settles_the_pending_entry() {
        // No orphan placeholders: after resolution the entry is either gone
        // (success) or annotated (failure), never silently unresolved.
        let mut eng = engine();

        let ok = eng.begin_launch(&request("acme/web", "x")).unwrap();
        eng.complete_launch(&ok, "ag_ok").unwrap();
        assert!(!eng.is_pending(&ok));

        let bad = eng.begin_launch(&request("acme/web", "y")).unwrap();
        eng.fail_launch(&bad, "nope");
        assert!(eng.is_pending(&bad));
        assert!(eng.pending_launch(&bad).unwrap().error.is_some());
    }

    #[test]
    fn delete_on_confirmed_agent_requires_remote_delete() {
        let mut eng = engine();
        eng.add_existing("ag_1").unwrap();
        assert!(eng.delete("ag_1").unwrap());
    }

    #[test]
    fn add_existing_rejects_duplicates() {
        let mut eng = engine();
        assert!(eng.add_existing("ag_1").unwrap());
        assert!(!eng.add_existing("ag_1").unwrap());
        assert_eq!(eng.store().grid().len(), 1);
    }

    #[test]
    fn placeholder_never_shadows_a_confirmed_agent() {
        let mut eng = engine();
        let temp = eng.begin_launch(&request("acme/web", "x")).unwrap();

        // Remote list already contains the id (contrived, but the overlay
        // rule must hold): the remote entry wins.
        let listed = remote(&temp, AgentStatus::Running);
        let panes = eng.panes(std::slice::from_ref(&listed));
        assert_eq!(panes.len(), 1);
        assert!(!panes[0].pending);
        assert_eq!(panes[0].agent.as_ref().unwrap().status, AgentStatus::Running);
    }

    #[test]
    fn unresolved_grid_item_renders_as_stub() {
        let mut eng = engine();
        eng.add_existing("ag_unknown").unwrap();
        let panes = eng.panes(&[]);
        assert_eq!(panes.len(), 1);
        assert!(panes[0].agent.is_none());
        assert!(!panes[0].pending);
    }

    #[test]
    fn focus_does_not_follow_swap_when_moved_elsewhere() {
        let mut eng = engine();
        eng.add_existing("ag_other").unwrap();
        let temp = eng.begin_launch(&request("acme/web", "x")).unwrap();
        assert_eq!(eng.focused_id(), Some(temp.as_str()));

        // User focuses another pane while the create call is in flight
        eng.focus(Some("ag_other".to_string()));
        eng.complete_launch(&temp, "ag_new").unwrap();
        assert_eq!(eng.focused_id(), Some("ag_other"));
    }

    #[test]
    fn remove_clears_focus_only_for_the_removed_pane() {
        let mut eng = engine();
        eng.add_existing("ag_1").unwrap();
        eng.add_existing("ag_2").unwrap();
        eng.focus(Some("ag_1".to_string()));

        eng.remove("ag_2").unwrap();
        assert_eq!(eng.focused_id(), Some("ag_1"));

        eng.remove("ag_1").unwrap();
        assert_eq!(eng.focused_id(), None);
    }

    #[test]
    fn focus_slot_follows_display_order() {
        let mut eng = engine();
        eng.add_existing("ag_a").unwrap();
        eng.add_existing("ag_b").unwrap();
        eng.add_existing("ag_c").unwrap();

        assert_eq!(eng.focus_slot(2).as_deref(), Some("ag_c"));
        assert_eq!(eng.focused_id(), Some("ag_c"));
        assert!(eng.focus_slot(9).is_none());
        assert_eq!(eng.focused_id(), Some("ag_c"));
    }
}
