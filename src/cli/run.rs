//! ticketwatch run command implementation

use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::events::EventDestination;
use crate::notify::{Notifier, NotifyOutcome, Passthrough, Summarizer};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::pipeline::{execute, RunOptions, RunReport};
use crate::slack::SlackWebhook;
use crate::summarize::GenerativeSummarizer;

/// Options for the run command
pub struct RunCommandOptions {
    pub snapshot: Option<PathBuf>,
    pub dry_run: bool,
    pub events: Option<String>,
    pub output: OutputOptions,
}

pub fn run(config: &Config, options: RunCommandOptions) -> Result<()> {
    let routing = config.routing_table();
    config.validate_for_run(&routing, !options.dry_run)?;

    let summarizer = build_summarizer(config)?;
    let transport = SlackWebhook::new(
        config.slack.webhook_url.clone().unwrap_or_default(),
        config.slack.timeout_ms,
    )?
    .with_identity(
        Some(config.slack.username.clone()),
        Some(config.slack.icon_emoji.clone()),
    );
    let notifier = Notifier::new(summarizer.as_ref(), &transport, &routing)
        .with_default_channel(config.slack.default_channel.clone())
        .with_fallback_max_chars(config.summary.fallback_max_chars);

    let mut sink = match EventDestination::parse(options.events.as_deref()) {
        Some(destination) => Some(destination.open()?),
        None => None,
    };

    let mut run_options = RunOptions::from_config(config);
    if let Some(snapshot) = options.snapshot {
        run_options.snapshot = snapshot;
    }
    run_options.dry_run = options.dry_run;

    let report = execute(config, &run_options, &notifier, sink.as_mut())?;

    let human = human_report(&report);
    emit_success(options.output, "run", &report, Some(&human))
}

fn build_summarizer(config: &Config) -> Result<Box<dyn Summarizer>> {
    let summary = &config.summary;
    if !summary.is_active() {
        tracing::debug!("summarizer disabled, action text is sent as-is");
        return Ok(Box::new(Passthrough));
    }

    let mut summarizer =
        GenerativeSummarizer::new(summary.api_key.clone().unwrap_or_default(), summary.timeout_ms)?
            .with_api_base(summary.api_base.clone())
            .with_model(summary.model.clone());
    if let Some(prompt) = summary.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        summarizer = summarizer.with_prompt(prompt);
    }
    Ok(Box::new(summarizer))
}

fn human_report(report: &RunReport) -> HumanOutput {
    let header = if report.dry_run {
        format!("ticketwatch run (dry run): {} change(s) detected", report.changes.len())
    } else if report.changes.is_empty() {
        "ticketwatch run: no changes".to_string()
    } else {
        format!(
            "ticketwatch run: {} change(s), {} notified",
            report.changes.len(),
            report.sent
        )
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("snapshot", report.snapshot.display().to_string());
    human.push_summary("rows", report.rows.to_string());
    human.push_summary("tracked", report.tracked.to_string());
    human.push_summary("suppressed", report.suppressed.to_string());
    human.push_summary(
        "state",
        if report.state_saved {
            format!("saved to {}", report.state_file.display())
        } else {
            "unchanged".to_string()
        },
    );
    if let Some(persist) = &report.persist {
        if let Some(commit) = &persist.commit {
            human.push_summary("commit", commit.chars().take(8).collect::<String>());
        }
    }

    for change in &report.changes {
        let outcome = match &change.notify {
            None => "not sent (dry run)".to_string(),
            Some(NotifyOutcome::Sent { channel, .. }) => format!("sent to {channel}"),
            Some(NotifyOutcome::Suppressed) => "suppressed (internal author)".to_string(),
            Some(NotifyOutcome::NoChannel) => "skipped (no channel)".to_string(),
            Some(NotifyOutcome::Failed { channel, reason }) => {
                format!("failed for {channel}: {reason}")
            }
        };
        human.push_detail(format!(
            "{:?} #{} ({}): {}",
            change.kind, change.ticket, change.status, outcome
        ));
    }

    if report.corrupt_state() {
        human.push_warning(format!(
            "state file was unusable ({}); every active ticket was treated as new",
            report.state_load
        ));
    }
    if report.failed > 0 {
        human.push_warning(format!("{} notification(s) failed", report.failed));
    }
    if report.no_channel > 0 {
        human.push_warning(format!(
            "{} notification(s) had no destination channel",
            report.no_channel
        ));
    }
    if report.skipped_rows > 0 {
        human.push_warning(format!("{} malformed row(s) skipped", report.skipped_rows));
    }
    if let Some(error) = report.persist.as_ref().and_then(|p| p.error.as_ref()) {
        human.push_warning(format!("state not persisted to git: {error}"));
    }
    if report.dry_run {
        human.push_next_step("ticketwatch run");
    }

    human
}
