//! One change-detection run
//!
//! lock -> read snapshot -> load state -> detect -> notify -> save -> persist
//!
//! The state document is written only after every event has been handed to
//! the notifier, and only when it differs from what was loaded. Git
//! persistence, when enabled, runs on every non-dry run. A dry run stops
//! after detection.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::detect::{detect, ChangeKind};
use crate::error::Result;
use crate::events::{Event, EventKind, EventSink};
use crate::git::{persist_state, PersistOutcome};
use crate::lock::{lock_path_for, RunLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::notify::{Notifier, NotifyOutcome};
use crate::snapshot::read_snapshot;
use crate::state::{LoadStatus, StateStore};

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub snapshot: PathBuf,
    pub dry_run: bool,
    pub lock_timeout_ms: u64,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            snapshot: config.snapshot.clone(),
            dry_run: false,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// One detected change and what the notifier did with it.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub ticket: String,
    pub customer: String,
    pub status: String,
    pub action_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub suppressed: bool,
    /// Absent on dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyOutcome>,
}

/// Summary of a run, printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub snapshot: PathBuf,
    pub state_file: PathBuf,
    pub state_load: String,
    pub dry_run: bool,
    pub rows: usize,
    pub skipped_rows: usize,
    /// Rows whose action log had no parseable action.
    pub skipped_actions: usize,
    pub tracked: usize,
    pub changes: Vec<ChangeRecord>,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub no_channel: usize,
    pub state_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist: Option<PersistOutcome>,
}

impl RunReport {
    pub fn corrupt_state(&self) -> bool {
        self.state_load.starts_with("corrupt")
    }
}

/// Execute one run.
///
/// Fatal: lock timeout, unreadable snapshot, failure to write the state.
/// Everything downstream of detection (summaries, posts, git) only logs.
pub fn execute(
    config: &Config,
    options: &RunOptions,
    notifier: &Notifier<'_>,
    mut events: Option<&mut EventSink>,
) -> Result<RunReport> {
    let _lock = RunLock::acquire(lock_path_for(&config.state_file), options.lock_timeout_ms)?;

    let snapshot = read_snapshot(&options.snapshot, &config.snapshot_options())?;
    let store = StateStore::new(&config.state_file);
    let loaded = store.load();

    let detection = detect(&snapshot.rows, &loaded.state, &config.detector_config());
    tracing::info!(
        changes = detection.events.len(),
        suppressed = detection.suppressed_count(),
        tracked = detection.new_state.len(),
        "detection complete"
    );

    let mut changes = Vec::with_capacity(detection.events.len());
    for event in &detection.events {
        let outcome = if options.dry_run {
            None
        } else {
            Some(notifier.notify(event))
        };

        let record = ChangeRecord {
            kind: event.kind,
            ticket: event.ticket.id.clone(),
            customer: event.ticket.customer.clone(),
            status: crate::status::normalize_status(&event.ticket.status),
            action_number: event.action.number,
            author: event.action.author.clone(),
            suppressed: event.suppressed,
            notify: outcome,
        };

        if let Some(sink) = events.as_deref_mut() {
            let line = Event::new(EventKind::from(event.kind), Some(record.ticket.clone()))
                .with_data(&record)?;
            if let Err(err) = sink.emit(&line) {
                tracing::warn!(error = %err, "failed to write event line");
            }
        }
        changes.push(record);
    }

    let count = |pred: fn(&NotifyOutcome) -> bool| {
        changes
            .iter()
            .filter(|c| c.notify.as_ref().map(pred).unwrap_or(false))
            .count()
    };
    let sent = count(NotifyOutcome::is_sent);
    let failed = count(|o| matches!(o, NotifyOutcome::Failed { .. }));
    let no_channel = count(|o| matches!(o, NotifyOutcome::NoChannel));

    let (state_saved, persist) = if options.dry_run {
        (false, None)
    } else {
        let saved = store.save_if_changed(&loaded.state, &detection.new_state)?;
        // Every run, so a commit or push that failed earlier is retried.
        let persist = if config.persist.git_commit {
            Some(persist_state(&config.state_file, &config.persist))
        } else {
            None
        };
        (saved, persist)
    };

    let report = RunReport {
        snapshot: options.snapshot.clone(),
        state_file: config.state_file.clone(),
        state_load: match &loaded.status {
            LoadStatus::Missing => "missing".to_string(),
            LoadStatus::Loaded => "loaded".to_string(),
            LoadStatus::Corrupt(reason) => format!("corrupt: {reason}"),
        },
        dry_run: options.dry_run,
        rows: snapshot.rows.len(),
        skipped_rows: snapshot.skipped,
        skipped_actions: detection.skipped,
        tracked: detection.new_state.len(),
        suppressed: detection.suppressed_count(),
        changes,
        sent,
        failed,
        no_channel,
        state_saved,
        persist,
    };

    if let Some(sink) = events {
        let summary = Event::new(EventKind::RunCompleted, None).with_data(serde_json::json!({
            "changes": report.changes.len(),
            "sent": report.sent,
            "suppressed": report.suppressed,
            "failed": report.failed,
            "state_saved": report.state_saved,
        }))?;
        if let Err(err) = sink.emit(&summary) {
            tracing::warn!(error = %err, "failed to write event line");
        }
    }

    tracing::info!(
        sent = report.sent,
        suppressed = report.suppressed,
        failed = report.failed,
        state_saved = report.state_saved,
        "run complete"
    );
    Ok(report)
}
