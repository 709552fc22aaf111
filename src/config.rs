//! Configuration loading and management
//!
//! Sources, later ones winning:
//! 1) built-in defaults
//! 2) `ticketwatch.toml` (or the file given with `--config`)
//! 3) environment variables (credentials and per-deployment values)
//!
//! The resulting [`Config`] is built once per run and passed by reference.
//! Structural problems are rejected at load; missing credentials, roster or
//! channels are rejected by [`Config::validate_for_run`] before any work.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detect::{ChangeSignal, DetectorConfig};
use crate::error::{Error, Result};
use crate::notify::RoutingTable;
use crate::roster::InternalRoster;
use crate::snapshot::{ColumnMap, SnapshotOptions};
use crate::status::{TerminalStatuses, DEFAULT_TERMINAL_STATUSES};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "ticketwatch.toml";

pub const ENV_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const ENV_DEFAULT_CHANNEL: &str = "SLACK_CHANNEL";
pub const ENV_SUMMARY_API_KEY: &str = "GOOGLE_AI_API_KEY";
pub const ENV_INTERNAL_AUTHORS: &str = "TICKETWATCH_INTERNAL_AUTHORS";
pub const ENV_CHANNEL_ROUTING: &str = "TICKETWATCH_CHANNEL_ROUTING";
pub const ENV_STATE_FILE: &str = "TICKETWATCH_STATE_FILE";
pub const ENV_SNAPSHOT: &str = "TICKETWATCH_SNAPSHOT";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Export file read by `run` and `report`
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,

    /// Persisted state document
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// How a known ticket is judged to have a new action
    #[serde(default)]
    pub change_signal: ChangeSignal,

    /// Statuses after which a ticket stops being tracked
    #[serde(default = "default_terminal_statuses")]
    pub terminal_statuses: Vec<String>,

    /// Force the CSV delimiter instead of detecting it
    #[serde(default)]
    pub csv_delimiter: Option<String>,

    /// Export header names
    #[serde(default)]
    pub columns: ColumnMap,

    #[serde(default)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub persist: PersistConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            state_file: default_state_file(),
            change_signal: ChangeSignal::default(),
            terminal_statuses: default_terminal_statuses(),
            csv_delimiter: None,
            columns: ColumnMap::default(),
            roster: RosterConfig::default(),
            slack: SlackConfig::default(),
            summary: SummaryConfig::default(),
            persist: PersistConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("downloads/file.csv")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/ticket_state.json")
}

fn default_terminal_statuses() -> Vec<String> {
    DEFAULT_TERMINAL_STATUSES
        .iter()
        .map(|status| status.to_string())
        .collect()
}

/// Internal team configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Authors whose actions are never announced (substring match)
    #[serde(default)]
    pub internal_authors: Vec<String>,
}

/// Chat notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL (usually from `SLACK_WEBHOOK_URL`)
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Channel used when the customer has no route
    #[serde(default)]
    pub default_channel: Option<String>,

    /// Inline customer -> channel routes
    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    /// JSON file with customer -> channel routes
    #[serde(default)]
    pub routing_file: Option<PathBuf>,

    /// Raw routing JSON from the environment; wins over `routing_file`
    #[serde(skip)]
    pub routing_json: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,

    #[serde(default = "default_slack_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_username() -> String {
    "Ticket Monitor".to_string()
}

fn default_icon_emoji() -> String {
    ":ticket:".to_string()
}

fn default_slack_timeout_ms() -> u64 {
    10_000
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            default_channel: None,
            routes: BTreeMap::new(),
            routing_file: None,
            routing_json: None,
            username: default_username(),
            icon_emoji: default_icon_emoji(),
            timeout_ms: default_slack_timeout_ms(),
        }
    }
}

/// Summarizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Summarize when an API key is available
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key (usually from `GOOGLE_AI_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_summary_api_base")]
    pub api_base: String,

    #[serde(default = "default_summary_model")]
    pub model: String,

    /// Instruction placed before the action text
    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(default = "default_summary_timeout_ms")]
    pub timeout_ms: u64,

    /// Raw text is cut to this many characters when summarization fails (0 = never)
    #[serde(default = "default_fallback_max_chars")]
    pub fallback_max_chars: usize,
}

fn default_true() -> bool {
    true
}

fn default_summary_api_base() -> String {
    crate::summarize::DEFAULT_API_BASE.to_string()
}

fn default_summary_model() -> String {
    crate::summarize::DEFAULT_MODEL.to_string()
}

fn default_summary_timeout_ms() -> u64 {
    30_000
}

fn default_fallback_max_chars() -> usize {
    1_500
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_base: default_summary_api_base(),
            model: default_summary_model(),
            prompt: None,
            timeout_ms: default_summary_timeout_ms(),
            fallback_max_chars: default_fallback_max_chars(),
        }
    }
}

impl SummaryConfig {
    /// Summarization runs only when enabled and a key is present.
    pub fn is_active(&self) -> bool {
        self.enabled
            && self
                .api_key
                .as_deref()
                .map(|key| !key.trim().is_empty())
                .unwrap_or(false)
    }
}

/// State persistence through git
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Commit the state file after it changes
    #[serde(default)]
    pub git_commit: bool,

    /// Push after committing
    #[serde(default)]
    pub git_push: bool,

    /// Repository to commit into (discovered from the state file when unset)
    #[serde(default)]
    pub repo: Option<PathBuf>,

    #[serde(default)]
    pub author_name: Option<String>,

    #[serde(default)]
    pub author_email: Option<String>,

    /// Commit message prefix; a timestamp is appended
    #[serde(default = "default_commit_message")]
    pub message: String,
}

fn default_commit_message() -> String {
    "chore: update ticket state".to_string()
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            git_commit: false,
            git_push: false,
            repo: None,
            author_name: None,
            author_email: None,
            message: default_commit_message(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for per-run log files; stderr only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit file, else `ticketwatch.toml` if present, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides through `lookup`. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_WEBHOOK_URL) {
            self.slack.webhook_url = Some(url.trim().to_string());
        }
        if let Some(channel) = get(ENV_DEFAULT_CHANNEL) {
            self.slack.default_channel = Some(channel.trim().to_string());
        }
        if let Some(key) = get(ENV_SUMMARY_API_KEY) {
            self.summary.api_key = Some(key.trim().to_string());
        }
        if let Some(authors) = get(ENV_INTERNAL_AUTHORS) {
            self.roster.internal_authors = InternalRoster::from_csv_list(&authors).into();
        }
        if let Some(routing) = get(ENV_CHANNEL_ROUTING) {
            self.slack.routing_json = Some(routing);
        }
        if let Some(path) = get(ENV_STATE_FILE) {
            self.state_file = PathBuf::from(path.trim());
        }
        if let Some(path) = get(ENV_SNAPSHOT) {
            self.snapshot = PathBuf::from(path.trim());
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log.level = level.trim().to_lowercase();
        }
    }

    pub fn roster(&self) -> InternalRoster {
        InternalRoster::new(&self.roster.internal_authors)
    }

    pub fn terminal(&self) -> TerminalStatuses {
        TerminalStatuses::new(&self.terminal_statuses)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            signal: self.change_signal,
            terminal: self.terminal(),
            roster: self.roster(),
        }
    }

    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            columns: self.columns.clone(),
            delimiter: self
                .csv_delimiter
                .as_deref()
                .and_then(|d| d.bytes().next()),
            require_last_action_date: self.change_signal == ChangeSignal::Date,
        }
    }

    /// Build the routing table from inline routes plus env JSON or the routing file.
    ///
    /// Malformed or unreadable routing degrades to the inline routes only.
    pub fn routing_table(&self) -> RoutingTable {
        let mut routes = self.slack.routes.clone();

        let external = if let Some(raw) = self.slack.routing_json.as_deref() {
            Some(RoutingTable::from_json_lenient(raw, ENV_CHANNEL_ROUTING))
        } else if let Some(path) = self.slack.routing_file.as_deref() {
            match std::fs::read_to_string(path) {
                Ok(raw) => Some(RoutingTable::from_json_lenient(
                    &raw,
                    &path.display().to_string(),
                )),
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "cannot read routing file, ignoring it");
                    None
                }
            }
        } else {
            None
        };

        if let Some(table) = external {
            routes.extend(table.routes().clone());
        }

        RoutingTable::new(routes)
    }

    fn validate(&self) -> Result<()> {
        if self.terminal_statuses.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "terminal_statuses cannot include empty entries".to_string(),
            ));
        }
        if let Some(delimiter) = self.csv_delimiter.as_deref() {
            if delimiter.len() != 1 || !delimiter.is_ascii() {
                return Err(Error::InvalidConfig(format!(
                    "csv_delimiter must be a single ASCII character, got '{delimiter}'"
                )));
            }
        }
        if self.slack.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "slack.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.summary.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "summary.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.persist.git_push && !self.persist.git_commit {
            return Err(Error::InvalidConfig(
                "persist.git_push requires persist.git_commit".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that a run can notify correctly.
    ///
    /// Without a roster every internal reply would be announced, and without
    /// any channel every notification would be dropped, so both are fatal.
    /// The webhook is only required when notifications will be sent.
    pub fn validate_for_run(&self, routing: &RoutingTable, will_notify: bool) -> Result<()> {
        if self.roster().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "roster.internal_authors is empty (set it in the config file or {ENV_INTERNAL_AUTHORS})"
            )));
        }
        if !will_notify {
            return Ok(());
        }

        let webhook = self.slack.webhook_url.as_deref().map(str::trim).unwrap_or("");
        if webhook.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "slack.webhook_url is required (set it in the config file or {ENV_WEBHOOK_URL})"
            )));
        }

        let has_default = self
            .slack
            .default_channel
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_default && routing.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "no destination channel: set slack.default_channel ({ENV_DEFAULT_CHANNEL}) or channel routes"
            )));
        }

        Ok(())
    }
}
