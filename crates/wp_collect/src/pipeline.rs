//! Snapshot orchestration
//!
//! One poll walks `start -> session_set -> fetch -> project -> write ->
//! purge -> done`. The first failure before the purge ends the poll; a purge
//! failure is recorded on the outcome and the poll still succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use wp_config::WpConfig;
use wp_store::{SnapshotStore, StoreError, format_snapshot_ts};

use crate::projector::project_records;
use crate::retention::RetentionPurger;
use crate::session::{SessionQuery, SoapTransport};
use crate::CollectError;

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStage {
    SessionSet,
    Fetch,
    Project,
    Write,
    Purge,
    Done,
    Failed,
}

impl PollStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionSet => "session_set",
            Self::Fetch => "fetch",
            Self::Project => "project",
            Self::Write => "write",
            Self::Purge => "purge",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PollStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a poll
#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("{0}")]
    StoreWrite(StoreError),
}

/// Result of one poll, as reported to the trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOutcome {
    pub ok: bool,
    pub agents_total: usize,
    pub agents_written: usize,
    pub purged: usize,
    pub snapshot_ts: String,
    pub elapsed_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_error: Option<String>,
    /// Stage that was being attempted when the poll failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PollStage>,
}

impl PollOutcome {
    fn started(snapshot_ts: &DateTime<Utc>) -> Self {
        Self {
            ok: false,
            agents_total: 0,
            agents_written: 0,
            purged: 0,
            snapshot_ts: format_snapshot_ts(snapshot_ts),
            elapsed_sec: 0.0,
            error: None,
            purge_error: None,
            failed_stage: None,
        }
    }

    /// Terminal stage of this poll
    #[must_use]
    pub fn stage(&self) -> PollStage {
        if self.ok {
            PollStage::Done
        } else {
            PollStage::Failed
        }
    }
}

fn elapsed_rounded(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

/// End-to-end snapshot pipeline
pub struct SnapshotOrchestrator {
    session: SessionQuery,
    store: Arc<dyn SnapshotStore>,
    purger: RetentionPurger,
    tz_offset_hours: i64,
}

impl SnapshotOrchestrator {
    #[must_use]
    pub fn new(
        session: SessionQuery,
        store: Arc<dyn SnapshotStore>,
        purger: RetentionPurger,
        tz_offset_hours: i64,
    ) -> Self {
        Self {
            session,
            store,
            purger,
            tz_offset_hours,
        }
    }

    /// Wire a transport and a store together using the loaded configuration
    #[must_use]
    pub fn from_config(
        transport: Arc<dyn SoapTransport>,
        store: Arc<dyn SnapshotStore>,
        config: &WpConfig,
    ) -> Self {
        let session = SessionQuery::new(transport, &config.five9);
        let purger = RetentionPurger::new(store.clone(), config.retention.max_age_hours);
        Self::new(session, store, purger, config.five9.tz_offset_hours)
    }

    #[must_use]
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    #[must_use]
    pub fn purger(&self) -> &RetentionPurger {
        &self.purger
    }

    /// Steps up to and including the write. Returns the stage that failed.
    async fn collect_and_write(
        &self,
        snapshot_ts: DateTime<Utc>,
        outcome: &mut PollOutcome,
    ) -> Result<(), (PollStage, PollError)> {
        self.session
            .set_session()
            .await
            .map_err(|e| (PollStage::SessionSet, e.into()))?;
        debug!(stage = %PollStage::SessionSet, "Session established");

        let records = self
            .session
            .fetch_statistics()
            .await
            .map_err(|e| (PollStage::Fetch, e.into()))?;
        outcome.agents_total = records.len();
        debug!(stage = %PollStage::Fetch, agents = records.len(), "Statistics fetched");

        let rows = project_records(&records, snapshot_ts, self.tz_offset_hours);
        debug!(stage = %PollStage::Project, rows = rows.len(), "Records projected");

        if rows.is_empty() {
            debug!(stage = %PollStage::Write, "Nothing to write");
            return Ok(());
        }

        outcome.agents_written = self
            .store
            .insert_snapshot_rows(&rows)
            .await
            .map_err(|e| (PollStage::Write, PollError::StoreWrite(e)))?;
        debug!(
            stage = %PollStage::Write,
            written = outcome.agents_written,
            store = self.store.name(),
            "Snapshot written"
        );

        Ok(())
    }

    /// Run one poll. Never panics and never returns an error; failures are
    /// reported on the outcome.
    #[instrument(skip(self), name = "poll")]
    pub async fn run_poll(&self) -> PollOutcome {
        let started = Instant::now();
        let snapshot_ts = Utc::now();
        let mut outcome = PollOutcome::started(&snapshot_ts);

        if let Err((stage, err)) = self.collect_and_write(snapshot_ts, &mut outcome).await {
            outcome.error = Some(err.to_string());
            outcome.failed_stage = Some(stage);
            outcome.elapsed_sec = elapsed_rounded(started);
            error!(
                stage = %stage,
                error = %err,
                elapsed_sec = outcome.elapsed_sec,
                "Poll failed"
            );
            return outcome;
        }

        match self.purger.purge(Utc::now()).await {
            Ok(purged) => outcome.purged = purged,
            Err(e) => {
                warn!(stage = %PollStage::Purge, error = %e, "Retention purge failed");
                outcome.purge_error = Some(e.to_string());
            }
        }

        outcome.ok = true;
        outcome.elapsed_sec = elapsed_rounded(started);
        info!(
            agents_total = outcome.agents_total,
            agents_written = outcome.agents_written,
            purged = outcome.purged,
            elapsed_sec = outcome.elapsed_sec,
            "Poll complete"
        );
        outcome
    }
}
