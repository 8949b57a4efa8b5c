//! Timestamp formatting helpers for HostCare.
//!
//! Provides consistent date/time display across log lines and reports.
//! Timestamps are stored in UTC and rendered in local time.

use chrono::{DateTime, Duration, Local, Utc};

/// Format a UTC timestamp as local `YYYY-MM-DD HH:MM:SS`.
///
/// This is the format used by report rows, CSV cells and log-line prefixes.
pub fn format_local_timestamp(ts: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = ts.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format only the local time of day (`HH:MM:SS`).
pub fn format_local_time(ts: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = ts.with_timezone(&Local);
    local.format("%H:%M:%S").to_string()
}

/// Same as [`format_local_timestamp`] but renders `fallback` for `None`.
pub fn format_optional(ts: Option<&DateTime<Utc>>, fallback: &str) -> String {
    ts.map(format_local_timestamp)
        .unwrap_or_else(|| fallback.to_string())
}

/// Format a `std::time::Duration` into a human-readable string.
///
/// Examples: `5.0ms`, `1.2s`, `1.5m`.
pub fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 0.01 {
        format!("{:.1}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let mins = secs / 60.0;
        format!("{mins:.1}m")
    }
}

/// The UTC instant `days` days before `now`.
///
/// Any value is accepted; reports usually look back 1, 7 or 30 days.
pub fn days_ago(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}
