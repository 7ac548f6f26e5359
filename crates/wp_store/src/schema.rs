//! Schema definitions and constants

/// Table names
pub mod tables {
    pub const AGENT_SNAPSHOTS: &str = "five9_agent_snapshots";
}

/// Column names of the snapshot table
pub mod columns {
    pub const SNAPSHOT_TS: &str = "snapshot_ts";
    pub const USERNAME: &str = "username";
    pub const FULL_NAME: &str = "full_name";
    pub const STATE: &str = "state";
    pub const REASON_CODE: &str = "reason_code";
    pub const STATE_SINCE: &str = "state_since";
    pub const STATE_SINCE_UTC: &str = "state_since_utc";
    pub const STATE_DURATION: &str = "state_duration";
    pub const CAMPAIGN_NAME: &str = "campaign_name";
    pub const CALL_TYPE: &str = "call_type";
    pub const MEDIA_AVAILABILITY: &str = "media_availability";

    /// All persisted columns in table order
    pub const ALL: &[&str] = &[
        SNAPSHOT_TS,
        USERNAME,
        FULL_NAME,
        STATE,
        REASON_CODE,
        STATE_SINCE,
        STATE_SINCE_UTC,
        STATE_DURATION,
        CAMPAIGN_NAME,
        CALL_TYPE,
        MEDIA_AVAILABILITY,
    ];
}
