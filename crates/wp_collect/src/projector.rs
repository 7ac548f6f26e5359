//! Record projection: raw statistics records to persisted snapshot rows

use chrono::{DateTime, Utc};
use wp_store::SnapshotRow;

use crate::StatRecord;
use crate::timefmt::normalize_local_timestamp;

/// Agents in this state are not persisted
pub const EXCLUDED_STATE: &str = "Logged Out";

/// Source column names as declared by the `AgentState` statistic
pub mod fields {
    pub const USERNAME: &str = "Username";
    pub const FULL_NAME: &str = "Full Name";
    pub const STATE: &str = "State";
    pub const REASON_CODE: &str = "Reason Code";
    pub const STATE_SINCE: &str = "State Since";
    pub const STATE_DURATION: &str = "State Duration";
    pub const CAMPAIGN_NAME: &str = "Campaign Name";
    pub const CALL_TYPE: &str = "Call Type";
    pub const MEDIA_AVAILABILITY: &str = "Media Availability";
}

fn project_one(record: &StatRecord, snapshot_ts: DateTime<Utc>, offset_hours: i64) -> SnapshotRow {
    let field = |name: &str| record.get_or_empty(name).to_string();
    let state_since = field(fields::STATE_SINCE);

    SnapshotRow {
        snapshot_ts,
        username: field(fields::USERNAME),
        full_name: field(fields::FULL_NAME),
        state: field(fields::STATE),
        reason_code: field(fields::REASON_CODE),
        state_since_utc: normalize_local_timestamp(&state_since, offset_hours),
        state_since,
        state_duration: field(fields::STATE_DURATION),
        campaign_name: field(fields::CAMPAIGN_NAME),
        call_type: field(fields::CALL_TYPE),
        media_availability: field(fields::MEDIA_AVAILABILITY),
    }
}

/// Drop logged-out agents and shape the rest for storage.
///
/// Every returned row carries `snapshot_ts`; input order is preserved and
/// missing columns become empty strings.
#[must_use]
pub fn project_records(
    records: &[StatRecord],
    snapshot_ts: DateTime<Utc>,
    offset_hours: i64,
) -> Vec<SnapshotRow> {
    records
        .iter()
        .filter(|r| r.get(fields::STATE) != Some(EXCLUDED_STATE))
        .map(|r| project_one(r, snapshot_ts, offset_hours))
        .collect()
}
