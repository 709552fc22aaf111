//! Error types for ticketwatch
//!
//! Exit codes:
//! - 0: Success (including runs that sent zero notifications)
//! - 2: Configuration or user error (bad config, missing columns, bad args)
//! - 4: Operation failed (I/O, git, HTTP client setup, run lock)
//!
//! Collaborator failures (summarizer, webhook, corrupt state) never surface
//! here; they are recovered where they happen and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the ticketwatch CLI
pub mod exit_codes {
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for ticketwatch operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    #[error("Snapshot is missing required column '{column}' (expected header '{header}')")]
    MissingColumn { column: String, header: String },

    // Operation failures (exit code 4)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::SnapshotNotFound(_)
            | Error::MissingColumn { .. }
            | Error::TomlParse(_) => exit_codes::USER_ERROR,

            Error::Git(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Csv(_)
            | Error::Http(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for the JSON error envelope, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::MissingColumn { column, header } => Some(serde_json::json!({
                "column": column,
                "header": header,
            })),
            Error::SnapshotNotFound(path) | Error::LockFailed(path) => Some(serde_json::json!({
                "path": path.display().to_string(),
            })),
            _ => None,
        }
    }
}

/// Result type alias for ticketwatch operations
pub type Result<T> = std::result::Result<T, Error>;
