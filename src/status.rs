//! Ticket status normalization and the terminal-status set.

use std::collections::BTreeSet;

/// Terminal statuses used when the configuration does not list any.
pub const DEFAULT_TERMINAL_STATUSES: &[&str] = &[
    "Closed",
    "Resolved",
    "Cancelled",
    "Completed",
    "Fechado",
    "Resolvido",
    "Cancelado",
    "Concluído",
];

/// Trim, collapse inner whitespace and title-case a status label.
///
/// `"  em   ANDAMENTO "` becomes `"Em Andamento"`.
pub fn normalize_status(raw: &str) -> String {
    raw.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Normalized set of statuses after which a ticket is no longer tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalStatuses {
    statuses: BTreeSet<String>,
}

impl TerminalStatuses {
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            statuses: statuses
                .into_iter()
                .map(|status| normalize_status(status.as_ref()))
                .filter(|status| !status.is_empty())
                .collect(),
        }
    }

    /// True when the raw status label is terminal after normalization.
    pub fn is_terminal(&self, raw_status: &str) -> bool {
        self.statuses.contains(&normalize_status(raw_status))
    }

    pub fn is_active(&self, raw_status: &str) -> bool {
        !self.is_terminal(raw_status)
    }
}

impl Default for TerminalStatuses {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_STATUSES)
    }
}
