#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use ticketwatch::action_log::ACTION_SEPARATOR;
use ticketwatch::state::State;

/// One row of a synthetic export.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub id: String,
    pub status: String,
    pub action_log: String,
    pub customer: String,
    pub subject: String,
    pub assignee: String,
    pub last_action_date: String,
}

impl Row {
    pub fn new(id: &str, status: &str, action_log: &str) -> Self {
        Self {
            id: id.to_string(),
            status: status.to_string(),
            action_log: action_log.to_string(),
            ..Self::default()
        }
    }

    pub fn customer(mut self, customer: &str) -> Self {
        self.customer = customer.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }
}

/// Action log with blocks newest-first, the way the portal exports it.
pub fn action_log(actions: &[(u64, &str, &str)]) -> String {
    let mut blocks: Vec<String> = actions
        .iter()
        .map(|(number, author, text)| {
            let day = number % 28 + 1;
            format!("{number} - Ação criada por {author} em {day:02}/01/2024 10:00\n{text}")
        })
        .collect();
    blocks.reverse();
    blocks.join(&format!("\n{ACTION_SEPARATOR}\n"))
}

/// Scratch directory holding an export, a state file and a config.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("downloads").join("file.csv")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("data").join("ticket_state.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("ticketwatch.toml")
    }

    /// Write a `;`-separated export with the portal's headers.
    pub fn write_snapshot(&self, rows: &[Row]) -> PathBuf {
        let path = self.snapshot_path();
        fs::create_dir_all(path.parent().expect("parent")).expect("create downloads");

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .expect("open export");
        writer
            .write_record([
                "Número",
                "Status",
                "Ações",
                "Data da última ação",
                "Assunto",
                "Responsável",
                "Cliente (Pessoa)",
            ])
            .expect("write header");
        for row in rows {
            writer
                .write_record([
                    row.id.as_str(),
                    row.status.as_str(),
                    row.action_log.as_str(),
                    row.last_action_date.as_str(),
                    row.subject.as_str(),
                    row.assignee.as_str(),
                    row.customer.as_str(),
                ])
                .expect("write row");
        }
        writer.flush().expect("flush export");
        path
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.config_path();
        fs::write(&path, contents).expect("write config");
        path
    }

    pub fn write_state_raw(&self, contents: &str) {
        let path = self.state_path();
        fs::create_dir_all(path.parent().expect("parent")).expect("create data");
        fs::write(path, contents).expect("write state");
    }

    pub fn read_state(&self) -> State {
        let raw = fs::read_to_string(self.state_path()).expect("read state");
        serde_json::from_str(&raw).expect("parse state")
    }
}
