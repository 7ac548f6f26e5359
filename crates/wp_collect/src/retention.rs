//! Rolling retention window over stored snapshots

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;
use wp_store::{SnapshotStore, StoreError};

/// Deletes snapshots older than a fixed age
pub struct RetentionPurger {
    store: Arc<dyn SnapshotStore>,
    max_age_hours: u64,
}

impl RetentionPurger {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, max_age_hours: u64) -> Self {
        Self {
            store,
            max_age_hours,
        }
    }

    #[must_use]
    pub fn max_age_hours(&self) -> u64 {
        self.max_age_hours
    }

    /// Oldest `snapshot_ts` that survives a purge at `now`
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Delete every snapshot with `snapshot_ts < now - window`
    ///
    /// # Errors
    ///
    /// Returns the store's error; callers treat it as non-fatal.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = self.cutoff(now);
        let deleted = self.store.delete_snapshots_before(cutoff).await?;
        debug!(%cutoff, deleted, store = self.store.name(), "Retention purge");
        Ok(deleted)
    }
}
