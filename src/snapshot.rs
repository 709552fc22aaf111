//! Snapshot reading
//!
//! Turns the portal's CSV export into [`TicketRow`]s. Exports come out of
//! the portal in Latin-1 or UTF-8 and with either `;` or `,` as delimiter,
//! so both are detected rather than configured by default. Header names are
//! mapped through [`ColumnMap`].
//!
//! Malformed records and rows without an id are skipped and logged; only a
//! missing required column fails the whole read.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One ticket as exported in a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketRow {
    pub id: String,
    pub status: String,
    pub assignee: String,
    pub customer: String,
    pub subject: String,
    pub action_log: String,
    pub last_action_date: String,
}

/// Export header names for each logical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_action_log")]
    pub action_log: String,
    #[serde(default = "default_last_action_date")]
    pub last_action_date: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_assignee")]
    pub assignee: String,
    #[serde(default = "default_customer")]
    pub customer: String,
}

fn default_id() -> String {
    "Número".to_string()
}

fn default_status() -> String {
    "Status".to_string()
}

fn default_action_log() -> String {
    "Ações".to_string()
}

fn default_last_action_date() -> String {
    "Data da última ação".to_string()
}

fn default_subject() -> String {
    "Assunto".to_string()
}

fn default_assignee() -> String {
    "Responsável".to_string()
}

fn default_customer() -> String {
    "Cliente (Pessoa)".to_string()
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            id: default_id(),
            status: default_status(),
            action_log: default_action_log(),
            last_action_date: default_last_action_date(),
            subject: default_subject(),
            assignee: default_assignee(),
            customer: default_customer(),
        }
    }
}

/// Options for reading an export.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub columns: ColumnMap,
    /// Forced delimiter; detected from the header line when `None`.
    pub delimiter: Option<u8>,
    /// Fail instead of filling blanks when the last-action-date column is absent.
    pub require_last_action_date: bool,
}

/// Rows read from one export.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub rows: Vec<TicketRow>,
    /// Records dropped for being malformed or lacking an id.
    pub skipped: usize,
}

impl Snapshot {
    /// Count of rows per normalized status.
    pub fn status_breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts
                .entry(crate::status::normalize_status(&row.status))
                .or_insert(0) += 1;
        }
        counts
    }
}

/// Read an export file from disk.
pub fn read_snapshot(path: &Path, options: &SnapshotOptions) -> Result<Snapshot> {
    if !path.exists() {
        return Err(Error::SnapshotNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let snapshot = parse_snapshot(&bytes, options)?;
    tracing::info!(
        path = %path.display(),
        rows = snapshot.rows.len(),
        skipped = snapshot.skipped,
        "snapshot read"
    );
    Ok(snapshot)
}

/// Parse export bytes.
pub fn parse_snapshot(bytes: &[u8], options: &SnapshotOptions) -> Result<Snapshot> {
    let text = decode(bytes);
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&text));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let layout = Layout::resolve(&headers, options)?;

    let mut snapshot = Snapshot::default();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(record = index + 1, error = %err, "skipping malformed record");
                snapshot.skipped += 1;
                continue;
            }
        };

        let id = normalize_id(layout.get(&record, Some(layout.id)));
        if id.is_empty() {
            tracing::warn!(record = index + 1, "skipping record without ticket id");
            snapshot.skipped += 1;
            continue;
        }

        snapshot.rows.push(TicketRow {
            id,
            status: layout.get(&record, Some(layout.status)).trim().to_string(),
            action_log: layout.get(&record, Some(layout.action_log)).to_string(),
            last_action_date: layout
                .get(&record, layout.last_action_date)
                .trim()
                .to_string(),
            subject: layout.get(&record, layout.subject).trim().to_string(),
            assignee: layout.get(&record, layout.assignee).trim().to_string(),
            customer: layout.get(&record, layout.customer).trim().to_string(),
        });
    }

    Ok(snapshot)
}

/// Column indexes resolved against one header record.
struct Layout {
    id: usize,
    status: usize,
    action_log: usize,
    last_action_date: Option<usize>,
    subject: Option<usize>,
    assignee: Option<usize>,
    customer: Option<usize>,
}

impl Layout {
    fn resolve(headers: &csv::StringRecord, options: &SnapshotOptions) -> Result<Self> {
        let columns = &options.columns;
        let find = |logical: &str, header: &str| -> Option<usize> {
            headers
                .iter()
                .position(|h| h.trim() == header.trim())
                .or_else(|| {
                    headers
                        .iter()
                        .position(|h| h.trim().eq_ignore_ascii_case(logical))
                })
        };
        let require = |logical: &str, header: &str| -> Result<usize> {
            find(logical, header).ok_or_else(|| Error::MissingColumn {
                column: logical.to_string(),
                header: header.to_string(),
            })
        };
        let optional = |logical: &str, header: &str| -> Option<usize> {
            let found = find(logical, header);
            if found.is_none() {
                tracing::warn!(column = logical, header, "optional column missing, using blanks");
            }
            found
        };

        Ok(Self {
            id: require("id", &columns.id)?,
            status: require("status", &columns.status)?,
            action_log: require("action_log", &columns.action_log)?,
            last_action_date: if options.require_last_action_date {
                Some(require("last_action_date", &columns.last_action_date)?)
            } else {
                optional("last_action_date", &columns.last_action_date)
            },
            subject: optional("subject", &columns.subject),
            assignee: optional("assignee", &columns.assignee),
            customer: optional("customer", &columns.customer),
        })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, index: Option<usize>) -> &'r str {
        index.and_then(|i| record.get(i)).unwrap_or("")
    }
}

/// UTF-8 when valid (BOM stripped), Latin-1 otherwise.
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!("export is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Pick `;` or `,` by counting them on the header line.
fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Spreadsheet round-trips turn numeric ids into `"123.0"`.
fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Número;Status;Assunto;Responsável;Cliente (Pessoa);Data da última ação;Ações";

    #[test]
    fn reads_semicolon_export() {
        let csv = format!(
            "{HEADER}\n100;Aberto;Impressora;Ana;ACME;01/01/2024;\"1 - Ação criada por Ana em 01/01/2024 oi\"\n"
        );
        let snapshot = parse_snapshot(csv.as_bytes(), &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        let row = &snapshot.rows[0];
        assert_eq!(row.id, "100");
        assert_eq!(row.status, "Aberto");
        assert_eq!(row.subject, "Impressora");
        assert_eq!(row.customer, "ACME");
        assert!(row.action_log.starts_with("1 - Ação"));
    }

    #[test]
    fn reads_latin1_bytes() {
        let mut bytes = Vec::new();
        // "Número;Status;Ações" in Latin-1
        bytes.extend_from_slice(b"N\xFAmero;Status;A\xE7\xF5es\n");
        bytes.extend_from_slice(b"7;Fechado;1 - texto\n");
        let snapshot = parse_snapshot(&bytes, &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].id, "7");
        assert_eq!(snapshot.rows[0].status, "Fechado");
        assert_eq!(snapshot.rows[0].customer, "");
    }

    #[test]
    fn accepts_logical_column_names() {
        let csv = "id,status,action_log,customer\n1,Open,\"1 - hi\",Globex\n";
        let snapshot = parse_snapshot(csv.as_bytes(), &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.rows[0].customer, "Globex");
    }

    #[test]
    fn missing_required_column_fails() {
        let csv = "id,status\n1,Open\n";
        let err = parse_snapshot(csv.as_bytes(), &SnapshotOptions::default()).unwrap_err();
        match err {
            Error::MissingColumn { column, .. } => assert_eq!(column, "action_log"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn date_column_can_be_required() {
        let csv = "id,status,action_log\n1,Open,\"1 - hi\"\n";
        let options = SnapshotOptions {
            require_last_action_date: true,
            ..SnapshotOptions::default()
        };
        match parse_snapshot(csv.as_bytes(), &options).unwrap_err() {
            Error::MissingColumn { column, header } => {
                assert_eq!(column, "last_action_date");
                assert_eq!(header, "Data da última ação");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let with_date = format!("{HEADER}\n1;Open;;;;02/01/2024 09:00;\"1 - hi\"\n");
        let snapshot = parse_snapshot(with_date.as_bytes(), &options).unwrap();
        assert_eq!(snapshot.rows[0].last_action_date, "02/01/2024 09:00");
    }

    #[test]
    fn rows_without_id_are_skipped() {
        let csv = "id,status,action_log\n,Open,x\n5.0,Open,\"1 - y\"\n";
        let snapshot = parse_snapshot(csv.as_bytes(), &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].id, "5");
    }

    #[test]
    fn status_breakdown_normalizes_labels() {
        let csv = "id,status,action_log\n1,open,a\n2,OPEN ,b\n3,Closed,c\n";
        let snapshot = parse_snapshot(csv.as_bytes(), &SnapshotOptions::default()).unwrap();
        let breakdown = snapshot.status_breakdown();
        assert_eq!(breakdown.get("Open"), Some(&2));
        assert_eq!(breakdown.get("Closed"), Some(&1));
    }

    #[test]
    fn delimiter_detection() {
        assert_eq!(detect_delimiter("a;b;c\n1,2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }
}
