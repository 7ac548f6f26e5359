//! `wp_collect` - Agent state snapshot pipeline for wfm-poller
//!
//! This crate provides:
//! - The Five9 stateless session protocol ([`SessionQuery`] over a [`SoapTransport`])
//! - Parsing of namespaced `getStatistics` payloads into [`StatRecord`]s
//! - Timestamp normalization from the Five9 domain clock to UTC
//! - Projection of records into persisted [`wp_store::SnapshotRow`]s
//! - Retention purge and the end-to-end [`SnapshotOrchestrator`]
//!
//! # Pipeline Design Principles
//!
//! 1. **Stateless per poll**: the remote session is re-established on every poll
//! 2. **Pure core**: parsing, normalization and projection perform no I/O
//! 3. **Fail fast, purge soft**: any failure before the write ends the poll;
//!    a failed purge is reported but never fails the poll
//! 4. **Timeout-bounded**: every remote call has a fixed ceiling

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod parser;
pub mod pipeline;
pub mod projector;
pub mod retention;
pub mod session;
pub mod timefmt;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use parser::parse_statistics;
pub use pipeline::{PollError, PollOutcome, PollStage, SnapshotOrchestrator};
pub use projector::{EXCLUDED_STATE, project_records};
pub use retention::RetentionPurger;
pub use session::{HttpSoapTransport, SessionQuery, SoapResponse, SoapTransport};
pub use timefmt::normalize_local_timestamp;

/// Collection errors
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Failed to set Five9 session: {0}")]
    SessionError(String),

    #[error("Five9 returned {status}: {body}")]
    RemoteError { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("{0}")]
    SchemaError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

/// One row of a statistics response: column name to raw value.
///
/// Columns are whatever the response declared; values are never typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatRecord {
    fields: HashMap<String, String>,
}

impl StatRecord {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value for the same column
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Value for a column, if the row populated it
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value for a column, or `""` when absent
    #[must_use]
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or_default()
    }

    /// Number of populated columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no columns were populated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over populated columns (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StatRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
