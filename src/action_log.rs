//! Action-log parsing
//!
//! The portal exports every ticket's history as one text cell. Actions are
//! separated by a rule of dashes and each one starts with its sequence number:
//!
//! ```text
//! 1 - Ação criada por Ana em 01/01/2024 10:15 Olá, segue retorno.
//! -----------------------------
//! 2 - Ação criada por Carlos Lima em 02/01/2024 08:00 Chamado encerrado.
//! ```
//!
//! [`parse_last_action`] returns the action with the highest sequence number,
//! with the attribution header split off into `author` and `date`.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Separator the portal places between actions.
pub const ACTION_SEPARATOR: &str = "-----------------------------";

/// Rendered in place of a missing author.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Delimiter between the sequence number and the action body.
const NUMBER_DELIMITER: &str = " - ";

/// The most recent action of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAction {
    /// Sequence number from the action prefix.
    pub number: u64,
    /// Action body with the attribution header removed.
    pub text: String,
    /// Author captured from the header, if the header was recognized.
    pub author: Option<String>,
    /// Date captured from the header, if the header was recognized.
    pub date: Option<String>,
}

impl ParsedAction {
    /// Author name, or [`UNKNOWN_AUTHOR`] when the header was not recognized.
    pub fn author_display(&self) -> &str {
        self.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    }
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Longer rules show up when the export is re-saved by a spreadsheet tool.
    PATTERN.get_or_init(|| Regex::new(r"-{29,}").expect("separator pattern is valid"))
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*a[çc][ãa]o\s+criada\s+por\s+(?P<author>.+?)\s+em\s+(?P<date>\d{1,2}/\d{1,2}/\d{2,4}(?:\s+(?:às\s+)?\d{1,2}:\d{2}(?::\d{2})?)?)",
        )
        .expect("header pattern is valid")
    })
}

/// Extract the most recent action from a ticket's action history.
///
/// Returns `None` when the log is empty or no block carries a parseable
/// sequence number. Blocks that fail to parse are skipped individually.
/// When two blocks share the highest number, the first one wins.
pub fn parse_last_action(action_log: &str) -> Option<ParsedAction> {
    if action_log.trim().is_empty() {
        return None;
    }

    let mut best: Option<(u64, &str, &str)> = None;
    for block in separator_pattern().split(action_log) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let Some((number, body)) = split_sequence_number(block) else {
            tracing::trace!(block = %preview(block), "skipping action block without sequence number");
            continue;
        };
        match best {
            Some((current, _, _)) if current >= number => {}
            _ => best = Some((number, block, body)),
        }
    }

    let (number, block, body) = best?;
    Some(with_header(number, block, body))
}

/// Most recent action of a log whose blocks carry no sequence number.
///
/// Takes the last non-empty block and numbers it 0. Only meaningful when
/// changes are judged by the export's date column.
pub fn parse_unnumbered_action(action_log: &str) -> Option<ParsedAction> {
    let block = separator_pattern()
        .split(action_log)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .last()?;
    Some(with_header(0, block, block))
}

fn with_header(number: u64, block: &str, body: &str) -> ParsedAction {
    match header_pattern().captures(body) {
        Some(caps) => {
            let header_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let author = caps
                .name("author")
                .map(|m| m.as_str().trim().to_string())
                .filter(|name| !name.is_empty());
            ParsedAction {
                number,
                text: body[header_end..].trim().to_string(),
                author,
                date: caps.name("date").map(|m| m.as_str().trim().to_string()),
            }
        }
        None => ParsedAction {
            number,
            text: block.to_string(),
            author: None,
            date: None,
        },
    }
}

/// Split `"<prefix> <n> - <body>"` into `(n, body)`.
///
/// The number is the last whitespace-separated token before the first
/// delimiter, so prefixes like `"Ação 12 - ..."` are accepted.
fn split_sequence_number(block: &str) -> Option<(u64, &str)> {
    let (prefix, body) = block.split_once(NUMBER_DELIMITER)?;
    let token = prefix.split_whitespace().last()?;
    let number = token.parse::<u64>().ok()?;
    Some((number, body))
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}
