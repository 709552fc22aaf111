//! ticketwatch - Support Ticket Change Notifications
//!
//! This library provides the core functionality for the ticketwatch CLI:
//! a periodic job that diffs a helpdesk export against the previous run and
//! posts chat notifications for tickets that changed.
//!
//! # Core Concepts
//!
//! - **Snapshot**: one CSV export of the ticket list
//! - **Action log**: a ticket's numbered history; only the latest entry matters
//! - **State**: last observed action per active ticket, persisted between runs
//! - **Roster**: internal team members whose replies are never announced
//! - **Routing**: customer to channel overrides on top of a default channel
//!
//! # Module Organization
//!
//! - `action_log`: Latest-action extraction from the history field
//! - `roster`: Internal-author classification
//! - `status`: Status normalization and terminal statuses
//! - `snapshot`: CSV export reading
//! - `state`: State document load/save
//! - `detect`: Change detection (new, updated, closed)
//! - `notify`: Message formatting, channel routing and dispatch
//! - `slack`: Webhook transport
//! - `summarize`: Generative-language summarizer
//! - `pipeline`: One full run, start to finish
//! - `git`: Committing the state document
//! - `lock`: Run lock and atomic writes
//! - `events`: JSONL change events
//! - `config`, `error`, `output`, `cli`: ambient plumbing

pub mod action_log;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod git;
pub mod lock;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod roster;
pub mod slack;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod summarize;

pub use error::{Error, Result};
