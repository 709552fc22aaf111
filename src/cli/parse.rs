//! ticketwatch parse command implementation
//!
//! Debugging aid for action-log format changes in the portal export.

use std::io::Read;
use std::path::PathBuf;

use serde::Serialize;

use crate::action_log::{parse_last_action, ParsedAction};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(Debug, Serialize)]
struct ParseReport {
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<ParsedAction>,
}

pub fn run(file: Option<PathBuf>, output: OutputOptions) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let action = parse_last_action(&raw);
    let mut human = match &action {
        Some(action) => {
            let mut human = HumanOutput::new(format!("last action: #{}", action.number));
            human.push_summary("author", action.author_display());
            human.push_summary("date", action.date.as_deref().unwrap_or("-"));
            human.push_detail(action.text.clone());
            human
        }
        None => HumanOutput::new("no action found"),
    };
    if action.is_none() && !raw.trim().is_empty() {
        human.push_warning("no block carries a \"<n> - \" sequence number");
    }

    let report = ParseReport {
        found: action.is_some(),
        action,
    };
    emit_success(output, "parse", &report, Some(&human))
}
