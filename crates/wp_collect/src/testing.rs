//! Test doubles for the pipeline's seams
//!
//! Available to this crate's tests and, via the `test-utils` feature, to
//! downstream crates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use wp_store::{SnapshotRow, SnapshotStore, StoreError};

use crate::CollectError;
use crate::session::{SoapResponse, SoapTransport};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a `getStatisticsResponse` envelope with the given declaration and rows
#[must_use]
pub fn agent_state_response(columns: &[&str], rows: &[&[&str]]) -> String {
    let values = |cells: &[&str]| -> String {
        let data: String = cells
            .iter()
            .map(|c| format!("<data>{}</data>", escape(*c)))
            .collect();
        format!("<values>{data}</values>")
    };

    let rows_xml: String = rows
        .iter()
        .map(|r| format!("<rows>{}</rows>", values(*r)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">
<env:Header/>
<env:Body>
<ns2:getStatisticsResponse xmlns:ns2="http://service.supervisor.ws.five9.com/">
<return><columns>{}</columns>{rows_xml}<type>AgentState</type></return>
</ns2:getStatisticsResponse>
</env:Body>
</env:Envelope>"#,
        values(columns)
    )
}

/// Transport that replays scripted responses in order and records each call
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<SoapResponse, CollectError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(script: Vec<Result<SoapResponse, CollectError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Session accepted, then the given statistics body
    #[must_use]
    pub fn ok_with(statistics_body: String) -> Self {
        Self::new(vec![
            Ok(SoapResponse::new(200, "<ok/>")),
            Ok(SoapResponse::new(200, statistics_body)),
        ])
    }

    /// Methods called so far, in order
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        guard(&self.calls).iter().map(|(m, _)| m.clone()).collect()
    }

    /// Method bodies sent so far, in order
    #[must_use]
    pub fn bodies(&self) -> Vec<String> {
        guard(&self.calls).iter().map(|(_, b)| b.clone()).collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        guard(&self.calls).len()
    }
}

#[async_trait]
impl SoapTransport for ScriptedTransport {
    async fn call(&self, method: &str, body_xml: &str) -> Result<SoapResponse, CollectError> {
        guard(&self.calls).push((method.to_string(), body_xml.to_string()));
        guard(&self.script).pop_front().unwrap_or_else(|| {
            Err(CollectError::HttpError(format!("no scripted response for {method}")))
        })
    }
}

/// In-memory store that records writes and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
    rows: Mutex<Vec<SnapshotRow>>,
    cutoffs: Mutex<Vec<DateTime<Utc>>>,
    insert_calls: Mutex<usize>,
    fail_insert: bool,
    fail_delete: bool,
}

impl RecordingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose inserts fail with a 500
    #[must_use]
    pub fn failing_insert() -> Self {
        Self {
            fail_insert: true,
            ..Self::default()
        }
    }

    /// A store whose deletes fail with a 503
    #[must_use]
    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }

    /// Pre-load rows without counting an insert call
    pub fn seed(&self, rows: impl IntoIterator<Item = SnapshotRow>) {
        guard(&self.rows).extend(rows);
    }

    #[must_use]
    pub fn rows(&self) -> Vec<SnapshotRow> {
        guard(&self.rows).clone()
    }

    #[must_use]
    pub fn insert_calls(&self) -> usize {
        *guard(&self.insert_calls)
    }

    /// Cutoffs passed to delete, in order
    #[must_use]
    pub fn cutoffs(&self) -> Vec<DateTime<Utc>> {
        guard(&self.cutoffs).clone()
    }
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn insert_snapshot_rows(&self, rows: &[SnapshotRow]) -> Result<usize, StoreError> {
        *guard(&self.insert_calls) += 1;
        if self.fail_insert {
            return Err(StoreError::StatusError {
                status: 500,
                body: "insert rejected".to_string(),
            });
        }
        guard(&self.rows).extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        guard(&self.cutoffs).push(cutoff);
        if self.fail_delete {
            return Err(StoreError::StatusError {
                status: 503,
                body: "delete unavailable".to_string(),
            });
        }
        let mut rows = guard(&self.rows);
        let before = rows.len();
        rows.retain(|r| r.snapshot_ts >= cutoff);
        Ok(before - rows.len())
    }
}
