//! Keyboard chord handling for the dashboard.
//!
//! Chords are global: they work the same whether or not a pane is focused.
//! Digit chords use Ctrl+Shift so plain digits stay available to text
//! inputs.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A user intention decoded from a key event in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open the launch input (Ctrl+K)
    OpenLaunch,
    /// Open the review-PR input (Ctrl+E)
    OpenReview,
    /// Open the add-existing-agent input (Ctrl+Shift+A)
    OpenAdd,
    /// Close the focused pane, keeping the remote agent (Ctrl+Shift+X)
    ClosePane,
    /// Delete the focused agent remotely and close its pane (Ctrl+Shift+D)
    DeleteAgent,
    /// Stop the focused agent (Ctrl+Shift+Backspace)
    StopAgent,
    /// Focus pane N, 0-based (Ctrl+Shift+1..9)
    FocusSlot(usize),
    /// Clear focus / dismiss the active input (Esc)
    Dismiss,
    /// Open the command palette (Ctrl+P)
    OpenPalette,
    /// Open the follow-up composer for the focused pane (Enter)
    Compose,
    /// Move focus to the next pane (Tab)
    FocusNext,
    /// Quit the dashboard (q)
    Quit,
}

/// Decode a normal-mode key event. `None` means the key is not bound.
pub fn action_for(key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    match key.code {
        KeyCode::Char(c) if ctrl && shift => match c.to_ascii_lowercase() {
            'a' => Some(Action::OpenAdd),
            'x' => Some(Action::ClosePane),
            'd' => Some(Action::DeleteAgent),
            '1'..='9' => Some(Action::FocusSlot(c as usize - '1' as usize)),
            _ => None,
        },
        // Terminals report Ctrl+Shift+digit without the shift flag on the
        // shifted symbol; accept the digits with ctrl alone too
        KeyCode::Char(c @ '1'..='9') if ctrl => Some(Action::FocusSlot(c as usize - '1' as usize)),
        KeyCode::Char(c) if ctrl => match c.to_ascii_lowercase() {
            'k' => Some(Action::OpenLaunch),
            'e' => Some(Action::OpenReview),
            'p' => Some(Action::OpenPalette),
            _ => None,
        },
        KeyCode::Backspace if ctrl && shift => Some(Action::StopAgent),
        KeyCode::Esc => Some(Action::Dismiss),
        KeyCode::Enter => Some(Action::Compose),
        KeyCode::Tab => Some(Action::FocusNext),
        KeyCode::Char('q') if key.modifiers.is_empty() => Some(Action::Quit),
        _ => None,
    }
}
