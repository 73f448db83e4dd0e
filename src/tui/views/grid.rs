//! Grid view: renders the pane list as a square-ish grid of agent cards.

use std::collections::HashMap;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::grid::Pane;
use crate::models::{AgentStatus, PrStatus};

/// Number of grid columns for a pane count: the smallest square that fits.
/// 1 pane fills the screen, 2-4 panes get two columns, 5-9 three, and so on.
pub fn columns_for(pane_count: usize) -> usize {
    if pane_count <= 1 {
        return 1;
    }
    (1..).find(|c| c * c >= pane_count).unwrap_or(1)
}

fn status_style(status: AgentStatus) -> Style {
    let color = match status {
        AgentStatus::Creating => Color::Yellow,
        AgentStatus::Running => Color::Cyan,
        AgentStatus::Finished => Color::Green,
        AgentStatus::Stopped => Color::DarkGray,
        AgentStatus::Error => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Stateless renderer for the pane grid.
pub struct GridView;

impl GridView {
    /// Lay the panes out in row-major order and render each card.
    pub fn render(
        frame: &mut Frame,
        area: Rect,
        panes: &[Pane],
        focused: Option<&str>,
        pr_statuses: &HashMap<String, PrStatus>,
    ) {
        if panes.is_empty() {
            let empty = Paragraph::new("No agents. Ctrl+K to launch one.")
                .block(Block::default().borders(Borders::ALL).title(" deckhand "));
            frame.render_widget(empty, area);
            return;
        }

        let cols = columns_for(panes.len());
        let rows = panes.len().div_ceil(cols);

        let row_areas = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Ratio(1, rows as u32); rows])
            .split(area);

        for (row_idx, row_area) in row_areas.iter().enumerate() {
            let cell_areas = Layout::default()
                .direction(Direction::Horizontal)
                .constraints(vec![Constraint::Ratio(1, cols as u32); cols])
                .split(*row_area);

            for col_idx in 0..cols {
                let pane_idx = row_idx * cols + col_idx;
                if let Some(pane) = panes.get(pane_idx) {
                    Self::render_card(
                        frame,
                        cell_areas[col_idx],
                        pane,
                        pane_idx,
                        focused,
                        pr_statuses,
                    );
                }
            }
        }
    }

    fn render_card(
        frame: &mut Frame,
        area: Rect,
        pane: &Pane,
        index: usize,
        focused: Option<&str>,
        pr_statuses: &HashMap<String, PrStatus>,
    ) {
        let is_focused = focused == Some(pane.item.agent_id.as_str());
        let border_style = if is_focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let title = match &pane.agent {
            Some(agent) => format!(" {} {} ", index + 1, agent.name),
            None => format!(" {} (unknown) ", index + 1),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title);

        let mut lines: Vec<Line> = Vec::new();
        match &pane.agent {
            Some(agent) => {
                let mut status_line = vec![Span::styled(
                    agent.status.label().to_uppercase(),
                    status_style(agent.status),
                )];
                if pane.pending {
                    status_line.push(Span::raw("  (unconfirmed)"));
                }
                lines.push(Line::from(status_line));

                if let Some(repo) = &agent.source.repository {
                    lines.push(Line::from(format!(
                        "  {}",
                        repo.trim_start_matches("https://github.com/")
                    )));
                }
                if let Some(pr) = &agent.target.pr_url {
                    let badge = match pr_statuses.get(pr) {
                        Some(PrStatus::Open) => " [open]",
                        Some(PrStatus::Draft) => " [draft]",
                        Some(PrStatus::Merged) => " [merged]",
                        Some(PrStatus::Closed) => " [closed]",
                        None => "",
                    };
                    lines.push(Line::from(format!("  PR {pr}{badge}")));
                }
                if let (Some(add), Some(del)) = (agent.lines_added, agent.lines_removed) {
                    lines.push(Line::from(format!("  +{add} -{del}")));
                }
                if let Some(error) = &pane.pending_error {
                    lines.push(Line::from(Span::styled(
                        format!("  launch failed: {error}"),
                        Style::default().fg(Color::Red),
                    )));
                } else if let Some(summary) = &agent.summary {
                    lines.push(Line::from(format!("  {summary}")));
                }
            }
            None => {
                lines.push(Line::from(Span::styled(
                    pane.item.agent_id.clone(),
                    Style::default().fg(Color::DarkGray),
                )));
                lines.push(Line::from("  not in the agent list"));
            }
        }

        let card = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
        frame.render_widget(card, area);
    }
}
