//! ticketwatch state command implementations

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::state::{LoadStatus, State, StateStore};

#[derive(Debug, Serialize)]
struct StateReport<'a> {
    path: &'a std::path::Path,
    status: &'static str,
    tickets: usize,
    state: &'a State,
}

pub fn run_show(config: &Config, output: OutputOptions) -> Result<()> {
    let store = StateStore::new(&config.state_file);
    let loaded = store.load();

    let status = match &loaded.status {
        LoadStatus::Missing => "missing",
        LoadStatus::Loaded => "loaded",
        LoadStatus::Corrupt(_) => "corrupt",
    };

    let report = StateReport {
        path: store.path(),
        status,
        tickets: loaded.state.len(),
        state: &loaded.state,
    };

    let mut human = HumanOutput::new(format!(
        "ticketwatch state: {} ticket(s) tracked",
        report.tickets
    ));
    human.push_summary("path", store.path().display().to_string());
    human.push_summary("status", status);
    for (id, entry) in &loaded.state {
        let number = entry
            .last_action_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let date = entry.last_action_date.as_deref().unwrap_or("-");
        human.push_detail(format!(
            "#{id}: {} (action {number}, {date})",
            entry.status
        ));
    }
    match &loaded.status {
        LoadStatus::Missing => human.push_next_step("ticketwatch run"),
        LoadStatus::Corrupt(reason) => {
            human.push_warning(format!("state file unusable: {reason}"));
        }
        LoadStatus::Loaded => {}
    }

    emit_success(output, "state show", &report, Some(&human))
}
