//! Command palette: fuzzy filtering over a list of entries.

/// One selectable palette entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Display text, also the match target.
    pub label: String,
    /// Opaque id handed back to the app on selection.
    pub id: String,
}

/// Case-insensitive subsequence match: every query character must appear in
/// the candidate, in order, not necessarily adjacent. Returns a score to
/// rank matches (lower is better); `None` means no match.
pub fn fuzzy_score(query: &str, candidate: &str) -> Option<usize> {
    if query.is_empty() {
        return Some(0);
    }

    let candidate_lower = candidate.to_lowercase();
    let mut chars = candidate_lower.char_indices();
    let mut first_hit = None;
    let mut last_hit = 0;

    for qc in query.to_lowercase().chars() {
        let (idx, _) = chars.find(|(_, cc)| *cc == qc)?;
        if first_hit.is_none() {
            first_hit = Some(idx);
        }
        last_hit = idx;
    }

    // Tighter spans and earlier starts rank higher
    let first = first_hit.unwrap_or(0);
    Some((last_hit - first) + first)
}

/// Filter and rank entries against a query. Ties keep the input order.
pub fn filter<'a>(query: &str, entries: &'a [PaletteEntry]) -> Vec<&'a PaletteEntry> {
    let mut scored: Vec<(usize, &PaletteEntry)> = entries
        .iter()
        .filter_map(|e| fuzzy_score(query, &e.label).map(|s| (s, e)))
        .collect();
    scored.sort_by_key(|(score, _)| *score);
    scored.into_iter().map(|(_, e)| e).collect()
}

/// Palette UI state: the query being typed and the selection cursor.
#[derive(Debug, Default)]
pub struct PaletteState {
    pub query: String,
    pub selected: usize,
}

impl PaletteState {
    pub fn push(&mut self, c: char) {
        self.query.push(c);
        self.selected = 0;
    }

    pub fn backspace(&mut self) {
        self.query.pop();
        self.selected = 0;
    }

    pub fn select_next(&mut self, visible: usize) {
        if visible > 0 && self.selected + 1 < visible {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}
