//! Five9 domain-clock timestamps
//!
//! Five9 reports `State Since` as naive local time in the domain's zone
//! (`YYYY-MM-DD HH:MM:SS`). The domain offset is treated as a constant; no
//! daylight-saving resolution is attempted.

use chrono::{NaiveDateTime, TimeDelta, Timelike};

/// Lexical form of Five9 local timestamps, also used for the normalized output
pub const LOCAL_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Byte length of a `YYYY-MM-DD HH:MM:SS` timestamp
const LOCAL_TS_LEN: usize = 19;

/// True only for the exact fixed-width form: digits with `-`, ` ` and `:`
/// at their positions. chrono alone is looser about whitespace and signs.
fn has_local_ts_shape(raw: &str) -> bool {
    raw.len() == LOCAL_TS_LEN
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            10 => b == b' ',
            13 | 16 => b == b':',
            _ => b.is_ascii_digit(),
        })
}

/// Shift a naive local timestamp at a fixed UTC offset to UTC.
///
/// `offset_hours` is negative west of UTC, so `-8` turns
/// `2024-01-15 10:00:00` into `2024-01-15 18:00:00`. Empty input yields
/// empty output; anything that does not parse is returned unchanged.
#[must_use]
pub fn normalize_local_timestamp(local_ts: &str, offset_hours: i64) -> String {
    if local_ts.is_empty() {
        return String::new();
    }

    if !has_local_ts_shape(local_ts) {
        return local_ts.to_string();
    }
    let Ok(naive) = NaiveDateTime::parse_from_str(local_ts, LOCAL_TS_FORMAT) else {
        return local_ts.to_string();
    };
    // Second 60 parses as a leap second
    if naive.nanosecond() >= 1_000_000_000 {
        return local_ts.to_string();
    }

    TimeDelta::try_hours(offset_hours)
        .and_then(|offset| naive.checked_sub_signed(offset))
        .map_or_else(
            || local_ts.to_string(),
            |utc| utc.format(LOCAL_TS_FORMAT).to_string(),
        )
}
