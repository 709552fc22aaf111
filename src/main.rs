//! ticketwatch - support ticket change notifications
//!
//! Scheduled job that compares the latest helpdesk export with the previous
//! run and announces new, updated and closed tickets in Slack.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use ticketwatch::cli::Cli;
use ticketwatch::config::LogConfig;
use ticketwatch::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let json = cli.json && !cli.events_to_stdout();

    let result = cli.load_config().and_then(|config| {
        init_tracing(&config.log);
        cli.run(config)
    });

    if let Err(err) = result {
        tracing::error!(error = %err, "ticketwatch failed");
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}

/// stderr always; a per-run file under `log.dir` when configured.
fn init_tracing(log: &LogConfig) {
    // RUST_LOG wins when valid; ignore invalid/huge filters.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .or_else(|| EnvFilter::try_new(log.level.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let file_layer = log.dir.as_deref().and_then(open_log_file).map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
}

fn open_log_file(dir: &Path) -> Option<File> {
    let name = format!(
        "ticketwatch_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let opened = std::fs::create_dir_all(dir).and_then(|_| File::create(dir.join(&name)));
    match opened {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("warning: cannot open log file in {}: {err}", dir.display());
            None
        }
    }
}
