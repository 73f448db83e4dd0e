//! TUI application: terminal management, event loop, and input modes.
//!
//! The event loop owns the [`GridEngine`] and drives all remote calls
//! through `spawn_blocking`, reporting results back over an mpsc channel.
//! Poll cadences come from the cache module; the loop never blocks on the
//! network.

use std::collections::{HashMap, HashSet};
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyEvent, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    layout::{Constraint, Direction, Layout},
    prelude::CrosstermBackend,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::keymap::{Action, action_for};
use super::palette::{PaletteEntry, PaletteState, filter};
use super::views::GridView;
use crate::agent_service::{AgentService, ServiceError};
use crate::cache::{
    AGENT_LIST_POLL, PR_STATUS_POLL, REVIEW_REQUESTS_POLL, Inflight, Mutation, PollKey,
    Subscription, agent_poll_interval,
};
use crate::grid::GridEngine;
use crate::models::{
    Agent, AgentSource, AgentStatus, FollowUpRequest, LaunchRequest, PrStatus, Prompt,
    ReviewRequest,
};
use crate::store::Store;

/// Service handle shared with background tasks.
pub type SharedService = Arc<dyn AgentService + Send + Sync>;

/// Results of background work, delivered to the event loop.
enum AppEvent {
    AgentsLoaded(Vec<Agent>),
    AgentLoaded(Box<Agent>),
    LaunchResolved {
        temp_id: String,
        result: Result<Agent, String>,
    },
    ReviewsLoaded(Vec<ReviewRequest>),
    /// The service 404ed an agent detail poll: the id no longer exists.
    AgentMissing(String),
    PrStatusLoaded(String, PrStatus),
    ActionDone {
        message: String,
        mutation: Mutation,
    },
    ActionFailed {
        message: String,
        /// In-flight key to release, for failed polls.
        inflight_key: Option<String>,
    },
}

impl AppEvent {
    fn failed(message: impl Into<String>) -> Self {
        AppEvent::ActionFailed {
            message: message.into(),
            inflight_key: None,
        }
    }

    fn poll_failed(message: impl Into<String>, key: impl Into<String>) -> Self {
        AppEvent::ActionFailed {
            message: message.into(),
            inflight_key: Some(key.into()),
        }
    }
}

/// Active input mode. Normal mode handles chords; the rest capture text.
enum Mode {
    Normal,
    /// Launch input: `owner/name: prompt text` (repo part optional).
    Launch(String),
    /// Review input: a PR URL.
    Review(String),
    /// Add-existing input: an agent id.
    Add(String),
    /// Follow-up composer for the focused agent.
    Compose(String),
    Palette(PaletteState),
}

struct App {
    engine: GridEngine,
    service: SharedService,
    tx: mpsc::UnboundedSender<AppEvent>,

    agents: Vec<Agent>,
    reviews: Vec<ReviewRequest>,
    pr_statuses: HashMap<String, PrStatus>,
    /// Ids the service 404ed; detail polling pauses until they reappear in
    /// the list or a mutation invalidates them.
    missing: HashSet<String>,
    mode: Mode,
    status: String,
    should_quit: bool,

    list_sub: Subscription,
    reviews_sub: Subscription,
    agent_sub: Subscription,
    pr_sub: Subscription,
    inflight: Inflight,
}

impl App {
    fn new(engine: GridEngine, service: SharedService, tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        let mut list_sub = Subscription::new(AGENT_LIST_POLL);
        list_sub.start();
        let mut reviews_sub = Subscription::new(REVIEW_REQUESTS_POLL);
        reviews_sub.start();
        let mut pr_sub = Subscription::new(PR_STATUS_POLL);
        pr_sub.start();

        Self {
            engine,
            service,
            tx,
            agents: Vec::new(),
            reviews: Vec::new(),
            pr_statuses: HashMap::new(),
            missing: HashSet::new(),
            mode: Mode::Normal,
            status: "Ctrl+K launch  Ctrl+E review  Ctrl+P palette  q quit".to_string(),
            should_quit: false,
            list_sub,
            reviews_sub,
            agent_sub: Subscription::new(crate::cache::ACTIVE_AGENT_POLL),
            pr_sub,
            inflight: Inflight::new(),
        }
    }

    fn focused_agent(&self) -> Option<&Agent> {
        let id = self.engine.focused_id()?;
        self.agents.iter().find(|a| a.id == id)
    }

    /// Fire any due polls and retune the focused-agent cadence.
    fn tick(&mut self, now: Instant) {
        if self.list_sub.due(now) && self.inflight.begin("agent-list") {
            self.list_sub.mark(now);
            let service = Arc::clone(&self.service);
            let tx = self.tx.clone();
            tokio::task::spawn_blocking(move || {
                match service.list() {
                    Ok(agents) => {
                        let _ = tx.send(AppEvent::AgentsLoaded(agents));
                    }
                    Err(e) => {
                        let _ = tx.send(AppEvent::poll_failed(format!("list: {e}"), "agent-list"));
                    }
                }
            });
        }

        let focused_status = self.focused_agent().map(|a| a.status);
        let focused_pending = self
            .engine
            .focused_id()
            .map(|id| self.engine.is_pending(id))
            .unwrap_or(false);
        match self.engine.focused_id() {
            // A pending placeholder has no remote detail to poll
            Some(_) if focused_pending => self.agent_sub.stop(),
            // Detail polling pauses for 404ed ids
            Some(id) if self.missing.contains(id) => self.agent_sub.stop(),
            Some(id) => {
                self.agent_sub.set_interval(agent_poll_interval(focused_status));
                if self.agent_sub.due(now) {
                    let key = format!("agent:{id}");
                    if self.inflight.begin(&key) {
                        self.agent_sub.mark(now);
                        let id = id.to_string();
                        let service = Arc::clone(&self.service);
                        let tx = self.tx.clone();
                        tokio::task::spawn_blocking(move || match service.get(&id) {
                            Ok(agent) => {
                                let _ = tx.send(AppEvent::AgentLoaded(Box::new(agent)));
                            }
                            Err(ServiceError::Status(404, _)) => {
                                let _ = tx.send(AppEvent::AgentMissing(id));
                            }
                            Err(e) => {
                                let _ = tx.send(AppEvent::poll_failed(
                                    format!("agent {id}: {e}"),
                                    format!("agent:{id}"),
                                ));
                            }
                        });
                    }
                }
            }
            None => self.agent_sub.stop(),
        }

        if self.reviews_sub.due(now) && self.inflight.begin("reviews") {
            self.reviews_sub.mark(now);
            // Reviews come from GitHub; without a token we leave the list
            // empty rather than erroring every two minutes
            if let Some(token) = self.engine.store().github_token() {
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || match crate::github::review_requests(&token) {
                    Ok(reviews) => {
                        let _ = tx.send(AppEvent::ReviewsLoaded(reviews));
                    }
                    Err(e) => {
                        let _ = tx.send(AppEvent::poll_failed(format!("reviews: {e}"), "reviews"));
                    }
                });
            } else {
                self.inflight.finish("reviews");
            }
        }

        if self.pr_sub.due(now) {
            self.pr_sub.mark(now);
            if let Some(token) = self.engine.store().github_token() {
                // One fetch per distinct PR URL across all panes
                let urls: Vec<String> = self
                    .engine
                    .panes(&self.agents)
                    .iter()
                    .filter_map(|p| p.agent.as_ref()?.target.pr_url.clone())
                    .collect();
                for url in urls {
                    let key = format!("pr:{url}");
                    if !self.inflight.begin(&key) {
                        continue;
                    }
                    let token = token.clone();
                    let tx = self.tx.clone();
                    tokio::task::spawn_blocking(move || {
                        match crate::github::pr_status(&token, &url) {
                            Ok(status) => {
                                let _ = tx.send(AppEvent::PrStatusLoaded(url, status));
                            }
                            Err(e) => {
                                let _ = tx.send(AppEvent::poll_failed(
                                    format!("pr status: {e}"),
                                    format!("pr:{url}"),
                                ));
                            }
                        }
                    });
                }
            }
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::AgentsLoaded(agents) => {
                self.inflight.finish("agent-list");
                self.agents = agents;
                // Anything the list knows again is no longer missing
                let agents = &self.agents;
                self.missing.retain(|id| !agents.iter().any(|a| &a.id == id));
            }
            AppEvent::AgentLoaded(agent) => {
                self.inflight.finish(&format!("agent:{}", agent.id));
                self.missing.remove(&agent.id);
                match self.agents.iter_mut().find(|a| a.id == agent.id) {
                    Some(existing) => *existing = *agent,
                    None => self.agents.push(*agent),
                }
            }
            AppEvent::LaunchResolved { temp_id, result } => match result {
                Ok(agent) => {
                    debug!(id = %agent.id, "launch confirmed");
                    if let Err(e) = self.engine.complete_launch(&temp_id, &agent.id) {
                        warn!("grid update failed: {e}");
                    }
                    self.agents.push(agent);
                    self.apply_invalidations(&Mutation::Launch);
                }
                Err(error) => {
                    warn!(%temp_id, "launch failed: {error}");
                    self.engine.fail_launch(&temp_id, error);
                }
            },
            AppEvent::ReviewsLoaded(reviews) => {
                self.inflight.finish("reviews");
                self.reviews = reviews;
            }
            AppEvent::AgentMissing(id) => {
                self.inflight.finish(&format!("agent:{id}"));
                self.status = format!("{id} no longer exists on the service");
                self.missing.insert(id);
            }
            AppEvent::PrStatusLoaded(url, status) => {
                self.inflight.finish(&format!("pr:{url}"));
                self.pr_statuses.insert(url, status);
            }
            AppEvent::ActionDone { message, mutation } => {
                self.status = message;
                self.apply_invalidations(&mutation);
            }
            AppEvent::ActionFailed {
                message,
                inflight_key,
            } => {
                if let Some(key) = inflight_key {
                    self.inflight.finish(&key);
                }
                self.status = message;
            }
        }
    }

    /// Refresh every cache entry a completed mutation staled.
    fn apply_invalidations(&mut self, mutation: &Mutation) {
        for key in mutation.invalidates() {
            match key {
                PollKey::AgentList => self.list_sub.invalidate(),
                PollKey::Agent(id) | PollKey::Conversation(id) => {
                    // Mutations retry a 404ed id
                    self.missing.remove(&id);
                    if self.engine.focused_id() == Some(id.as_str()) {
                        self.agent_sub.invalidate();
                    }
                }
                PollKey::PrStatus(url) => {
                    self.pr_statuses.remove(&url);
                    self.pr_sub.invalidate();
                }
                PollKey::ReviewRequests => self.reviews_sub.invalidate(),
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match &mut self.mode {
            Mode::Normal => {
                if let Some(action) = action_for(key) {
                    self.handle_action(action);
                }
            }
            Mode::Launch(_) | Mode::Review(_) | Mode::Add(_) | Mode::Compose(_) => {
                self.handle_input_key(key)
            }
            Mode::Palette(_) => self.handle_palette_key(key),
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::OpenLaunch => self.mode = Mode::Launch(String::new()),
            Action::OpenReview => self.mode = Mode::Review(String::new()),
            Action::OpenAdd => self.mode = Mode::Add(String::new()),
            Action::OpenPalette => self.mode = Mode::Palette(PaletteState::default()),
            Action::Dismiss => self.engine.focus(None),
            Action::Quit => self.should_quit = true,
            Action::FocusSlot(index) => {
                self.engine.focus_slot(index);
            }
            Action::FocusNext => self.focus_next(),
            Action::Compose => {
                if let Some(id) = self.engine.focused_id() {
                    if !self.engine.is_pending(id) {
                        let draft = self.engine.store().draft(id);
                        self.mode = Mode::Compose(draft);
                    }
                }
            }
            Action::ClosePane => {
                if let Some(id) = self.engine.focused_id().map(String::from) {
                    if let Err(e) = self.engine.remove(&id) {
                        self.status = format!("close failed: {e}");
                    }
                }
            }
            Action::DeleteAgent => {
                if let Some(id) = self.engine.focused_id().map(String::from) {
                    self.delete_agent(&id);
                }
            }
            Action::StopAgent => {
                if let Some(id) = self.engine.focused_id().map(String::from) {
                    if self.engine.is_pending(&id) {
                        self.status = "launch not confirmed yet".to_string();
                        return;
                    }
                    let service = Arc::clone(&self.service);
                    let tx = self.tx.clone();
                    tokio::task::spawn_blocking(move || match service.stop(&id) {
                        Ok(()) => {
                            let _ = tx.send(AppEvent::ActionDone {
                                message: format!("stopped {id}"),
                                mutation: Mutation::Stop(id),
                            });
                        }
                        Err(e) => {
                            let _ = tx.send(AppEvent::failed(format!("stop: {e}")));
                        }
                    });
                }
            }
        }
    }

    fn focus_next(&mut self) {
        let panes = self.engine.panes(&self.agents);
        if panes.is_empty() {
            return;
        }
        let next = match self.engine.focused_id() {
            Some(current) => panes
                .iter()
                .position(|p| p.item.agent_id == current)
                .map(|i| (i + 1) % panes.len())
                .unwrap_or(0),
            None => 0,
        };
        self.engine.focus(Some(panes[next].item.agent_id.clone()));
    }

    fn delete_agent(&mut self, id: &str) {
        match self.engine.delete(id) {
            Ok(true) => {
                let id = id.to_string();
                let service = Arc::clone(&self.service);
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || match service.delete(&id) {
                    Ok(()) => {
                        let _ = tx.send(AppEvent::ActionDone {
                            message: format!("deleted {id}"),
                            mutation: Mutation::Delete(id),
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(AppEvent::failed(format!("delete: {e}")));
                    }
                });
            }
            Ok(false) => self.status = "removed unconfirmed launch".to_string(),
            Err(e) => self.status = format!("delete failed: {e}"),
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        use crossterm::event::KeyCode;

        match key.code {
            KeyCode::Esc => {
                // Leaving the composer stores the draft for later
                if let Mode::Compose(text) = &self.mode {
                    if let Some(id) = self.engine.focused_id() {
                        if let Err(e) = self.engine.store().set_draft(id, text) {
                            warn!("draft save failed: {e}");
                        }
                    }
                }
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => self.submit_input(),
            KeyCode::Backspace => {
                if let Mode::Launch(s) | Mode::Review(s) | Mode::Add(s) | Mode::Compose(s) =
                    &mut self.mode
                {
                    s.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Mode::Launch(s) | Mode::Review(s) | Mode::Add(s) | Mode::Compose(s) =
                    &mut self.mode
                {
                    s.push(c);
                }
            }
            _ => {}
        }
    }

    fn submit_input(&mut self) {
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        match mode {
            Mode::Launch(input) => self.submit_launch(&input),
            Mode::Review(input) => {
                let url = input.trim().to_string();
                if url.is_empty() {
                    return;
                }
                let request = LaunchRequest {
                    prompt: Prompt::text(format!(
                        "Review the pull request at {url}. Read the diff carefully, \
                         point out bugs, risky changes, and missing tests, and \
                         summarize your findings as review comments."
                    )),
                    model: None,
                    source: AgentSource {
                        pr_url: Some(url),
                        ..AgentSource::default()
                    },
                    target: None,
                };
                self.start_launch(request);
            }
            Mode::Add(input) => {
                let id = input.trim().to_string();
                if id.is_empty() {
                    return;
                }
                match self.engine.add_existing(&id) {
                    Ok(true) => self.engine.focus(Some(id)),
                    Ok(false) => self.status = format!("{id} already in the grid"),
                    Err(e) => self.status = format!("add failed: {e}"),
                }
            }
            Mode::Compose(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return;
                }
                if let Some(id) = self.engine.focused_id().map(String::from) {
                    if let Err(e) = self.engine.store().set_draft(&id, "") {
                        warn!("draft clear failed: {e}");
                    }
                    let service = Arc::clone(&self.service);
                    let tx = self.tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let request = FollowUpRequest {
                            prompt: Prompt::text(text),
                        };
                        match service.follow_up(&id, &request) {
                            Ok(()) => {
                                let _ = tx.send(AppEvent::ActionDone {
                                    message: format!("sent to {id}"),
                                    mutation: Mutation::FollowUp(id),
                                });
                            }
                            Err(e) => {
                                let _ = tx.send(AppEvent::failed(format!("follow-up: {e}")));
                            }
                        }
                    });
                }
            }
            Mode::Normal | Mode::Palette(_) => {}
        }
    }

    /// Launch input format: `owner/name: prompt`, or just a prompt to let
    /// the service pick the default repository.
    fn submit_launch(&mut self, input: &str) {
        let (repo, prompt) = match input.split_once(':') {
            Some((repo, prompt)) if repo.contains('/') && !repo.contains(' ') => (
                Some(format!("https://github.com/{}", repo.trim())),
                prompt.trim().to_string(),
            ),
            _ => (None, input.trim().to_string()),
        };
        if prompt.is_empty() {
            self.status = "empty prompt, launch cancelled".to_string();
            return;
        }

        let request = LaunchRequest {
            prompt: Prompt::text(prompt),
            model: None,
            source: AgentSource {
                repository: repo,
                ..AgentSource::default()
            },
            target: None,
        };
        self.start_launch(request);
    }

    fn start_launch(&mut self, request: LaunchRequest) {
        let temp_id = match self.engine.begin_launch(&request) {
            Ok(id) => id,
            Err(e) => {
                self.status = format!("launch failed: {e}");
                return;
            }
        };

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = service.create(&request).map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::LaunchResolved { temp_id, result });
        });
    }

    fn handle_palette_key(&mut self, key: KeyEvent) {
        use crossterm::event::KeyCode;

        let entries = self.palette_entries();
        let Mode::Palette(state) = &mut self.mode else {
            return;
        };
        let visible = filter(&state.query, &entries).len();

        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Down => state.select_next(visible),
            KeyCode::Up => state.select_prev(),
            KeyCode::Backspace => state.backspace(),
            KeyCode::Enter => {
                let selection = filter(&state.query, &entries)
                    .get(state.selected)
                    .map(|e| e.id.clone());
                self.mode = Mode::Normal;
                if let Some(id) = selection {
                    self.engine.focus(Some(id));
                }
            }
            KeyCode::Char(c) => state.push(c),
            _ => {}
        }
    }

    /// Palette entries: one per pane, labeled by agent name and status.
    fn palette_entries(&self) -> Vec<PaletteEntry> {
        self.engine
            .panes(&self.agents)
            .into_iter()
            .map(|pane| {
                let label = match &pane.agent {
                    Some(agent) => format!("{} [{}]", agent.name, agent.status.label()),
                    None => pane.item.agent_id.clone(),
                };
                PaletteEntry {
                    label,
                    id: pane.item.agent_id,
                }
            })
            .collect()
    }

    fn render(&self, frame: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(frame.area());

        let panes = self.engine.panes(&self.agents);
        GridView::render(
            frame,
            chunks[0],
            &panes,
            self.engine.focused_id(),
            &self.pr_statuses,
        );

        let bottom = match &self.mode {
            Mode::Normal => {
                let running = self
                    .agents
                    .iter()
                    .filter(|a| a.status == AgentStatus::Running)
                    .count();
                let mut line = format!("{} panes, {} running", panes.len(), running);
                if !self.reviews.is_empty() {
                    line.push_str(&format!(", {} reviews waiting", self.reviews.len()));
                }
                line.push_str("  |  ");
                line.push_str(&self.status);
                Paragraph::new(line).block(Block::default().borders(Borders::ALL))
            }
            Mode::Launch(s) => Paragraph::new(format!("launch [repo: prompt]> {s}"))
                .block(Block::default().borders(Borders::ALL).title(" launch "))
                .style(Style::default().fg(Color::Yellow)),
            Mode::Review(s) => Paragraph::new(format!("pr url> {s}"))
                .block(Block::default().borders(Borders::ALL).title(" review "))
                .style(Style::default().fg(Color::Yellow)),
            Mode::Add(s) => Paragraph::new(format!("agent id> {s}"))
                .block(Block::default().borders(Borders::ALL).title(" add "))
                .style(Style::default().fg(Color::Yellow)),
            Mode::Compose(s) => Paragraph::new(format!("> {s}"))
                .block(Block::default().borders(Borders::ALL).title(" follow-up "))
                .style(Style::default().fg(Color::Cyan)),
            Mode::Palette(state) => {
                let entries = self.palette_entries();
                let hits = filter(&state.query, &entries);
                let picked = hits
                    .get(state.selected)
                    .map(|e| e.label.as_str())
                    .unwrap_or("");
                Paragraph::new(format!("palette> {}  [{picked}]", state.query))
                    .block(Block::default().borders(Borders::ALL).title(" palette "))
                    .style(Style::default().fg(Color::Magenta))
            }
        };
        frame.render_widget(bottom, chunks[1]);
    }
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout()))
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

/// Run the dashboard until the user quits.
pub async fn run_tui(store: Store, service: SharedService) -> crate::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::new(GridEngine::new(store), service, tx);

    let mut terminal = setup_terminal()?;

    loop {
        app.tick(Instant::now());
        terminal.draw(|f| app.render(f))?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if event::poll(Duration::from_millis(0))? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind == KeyEventKind::Press {
                            app.handle_key(key);
                        }
                    }
                }
            }
            ev = rx.recv() => {
                if let Some(ev) = ev {
                    app.handle_event(ev);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    restore_terminal()?;
    Ok(())
}
