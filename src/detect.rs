//! Change detection
//!
//! Reconciles one snapshot against the previously persisted state and
//! decides, per ticket, whether something worth announcing happened:
//!
//! | previous state | current status | action advanced | event            |
//! |----------------|----------------|-----------------|------------------|
//! | absent         | active         | n/a             | `New`            |
//! | absent         | terminal       | n/a             | none             |
//! | present        | active         | yes             | `Updated`        |
//! | present        | terminal       | yes             | `Closed`         |
//! | present        | any            | no              | none             |
//!
//! Events authored by an internal team member are still reported, flagged as
//! suppressed, so callers can count them without notifying anyone.
//!
//! The new state holds every active ticket with a parseable action and
//! nothing else; terminal tickets drop out the run they are seen terminal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action_log::{parse_last_action, parse_unnumbered_action, ParsedAction};
use crate::roster::{is_internal, InternalRoster};
use crate::snapshot::TicketRow;
use crate::state::{State, StateEntry};
use crate::status::{normalize_status, TerminalStatuses};

/// Signal used to decide whether a known ticket has a new action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSignal {
    /// Compare action sequence numbers (monotonic).
    #[default]
    Sequence,
    /// Compare the exported "last action date" text. Also accepts action
    /// logs that carry no numbering.
    Date,
}

impl std::str::FromStr for ChangeSignal {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequence" => Ok(ChangeSignal::Sequence),
            "date" => Ok(ChangeSignal::Date),
            _ => Err(crate::error::Error::InvalidArgument(format!(
                "invalid change signal '{}': must be sequence or date",
                s
            ))),
        }
    }
}

/// What happened to a ticket since the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Updated,
    Closed,
}

/// A detected change on one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub ticket: TicketRow,
    pub action: ParsedAction,
    /// Authored by an internal team member; never sent.
    pub suppressed: bool,
}

/// Inputs of the detector that come from configuration.
#[derive(Debug, Clone, Default)]
pub struct DetectorConfig {
    pub signal: ChangeSignal,
    pub terminal: TerminalStatuses,
    pub roster: InternalRoster,
}

/// Output of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub events: Vec<ChangeEvent>,
    pub new_state: State,
    /// Rows ignored because no action could be parsed from their log.
    pub skipped: usize,
}

impl Detection {
    /// Events that should reach the notification transport.
    pub fn notifiable(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().filter(|event| !event.suppressed)
    }

    pub fn suppressed_count(&self) -> usize {
        self.events.iter().filter(|event| event.suppressed).count()
    }
}

/// Compare a snapshot against the previous state.
///
/// `previous` is only read; the returned `new_state` is built from scratch.
/// When an id appears more than once, only its last row is considered.
pub fn detect(rows: &[TicketRow], previous: &State, config: &DetectorConfig) -> Detection {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        last_index.insert(row.id.as_str(), index);
    }

    let mut detection = Detection::default();
    for (index, row) in rows.iter().enumerate() {
        if last_index.get(row.id.as_str()) != Some(&index) {
            tracing::debug!(ticket = %row.id, "duplicate ticket row, keeping the last one");
            continue;
        }

        let Some(action) = last_action(&row.action_log, config.signal) else {
            tracing::warn!(ticket = %row.id, "no parseable action in log, skipping ticket");
            detection.skipped += 1;
            continue;
        };

        let is_active = config.terminal.is_active(&row.status);
        let kind = match previous.get(&row.id) {
            Some(prev) => {
                if advanced(prev, row, &action, config.signal) {
                    let was_active =
                        prev.status.trim().is_empty() || config.terminal.is_active(&prev.status);
                    if !is_active && was_active {
                        Some(ChangeKind::Closed)
                    } else {
                        Some(ChangeKind::Updated)
                    }
                } else {
                    None
                }
            }
            None if is_active => Some(ChangeKind::New),
            None => None,
        };

        if is_active {
            detection
                .new_state
                .insert(row.id.clone(), entry_for(row, &action));
        }

        if let Some(kind) = kind {
            let suppressed = is_internal(action.author.as_deref(), &config.roster);
            tracing::debug!(
                ticket = %row.id,
                ?kind,
                number = action.number,
                author = action.author_display(),
                suppressed,
                "change detected"
            );
            detection.events.push(ChangeEvent {
                kind,
                ticket: row.clone(),
                action,
                suppressed,
            });
        }
    }

    detection
}

/// Numbered logs always go through the sequence parser. Under the date
/// signal an unnumbered log still yields its last block.
fn last_action(action_log: &str, signal: ChangeSignal) -> Option<ParsedAction> {
    match signal {
        ChangeSignal::Sequence => parse_last_action(action_log),
        ChangeSignal::Date => {
            parse_last_action(action_log).or_else(|| parse_unnumbered_action(action_log))
        }
    }
}

/// Whether the current row carries a newer action than `prev`.
///
/// With the sequence signal, entries written before numbers were recorded
/// fall back to the date, and then to the cached text.
fn advanced(prev: &StateEntry, row: &TicketRow, action: &ParsedAction, signal: ChangeSignal) -> bool {
    match signal {
        ChangeSignal::Sequence => match prev.last_action_number {
            Some(number) => action.number > number,
            None => match prev.last_action_date.as_deref() {
                Some(date) if !date.trim().is_empty() => date.trim() != row.last_action_date.trim(),
                _ => prev.last_action.as_deref() != Some(action.text.as_str()),
            },
        },
        ChangeSignal::Date => {
            prev.last_action_date.as_deref().unwrap_or("").trim() != row.last_action_date.trim()
        }
    }
}

fn entry_for(row: &TicketRow, action: &ParsedAction) -> StateEntry {
    let date = row.last_action_date.trim();
    StateEntry {
        last_action_number: Some(action.number),
        last_action_date: if date.is_empty() {
            None
        } else {
            Some(date.to_string())
        },
        status: normalize_status(&row.status),
        last_action: Some(action.text.clone()),
    }
}
