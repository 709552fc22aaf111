//! ticketwatch report command implementation
//!
//! Overview of an export without touching state or chat.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::snapshot::read_snapshot;

#[derive(Debug, Serialize)]
struct SnapshotReport {
    snapshot: PathBuf,
    total: usize,
    active: usize,
    terminal: usize,
    skipped_rows: usize,
    statuses: BTreeMap<String, usize>,
}

pub fn run(config: &Config, snapshot: Option<PathBuf>, output: OutputOptions) -> Result<()> {
    let path = snapshot.unwrap_or_else(|| config.snapshot.clone());
    let snapshot = read_snapshot(&path, &config.snapshot_options())?;
    let terminal = config.terminal();

    let active = snapshot
        .rows
        .iter()
        .filter(|row| terminal.is_active(&row.status))
        .count();

    let report = SnapshotReport {
        snapshot: path,
        total: snapshot.rows.len(),
        active,
        terminal: snapshot.rows.len() - active,
        skipped_rows: snapshot.skipped,
        statuses: snapshot.status_breakdown(),
    };

    let mut human = HumanOutput::new(format!(
        "ticketwatch report: {} ticket(s), {} active",
        report.total, report.active
    ));
    human.push_summary("snapshot", report.snapshot.display().to_string());
    human.push_summary("total", report.total.to_string());
    human.push_summary("active", report.active.to_string());
    human.push_summary("terminal", report.terminal.to_string());
    for (status, count) in &report.statuses {
        human.push_detail(format!("{status}: {count}"));
    }
    if report.skipped_rows > 0 {
        human.push_warning(format!("{} malformed row(s) skipped", report.skipped_rows));
    }

    emit_success(output, "report", &report, Some(&human))
}
