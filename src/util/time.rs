//! Time formatting.

use chrono::{DateTime, Utc};

/// `2026-10-19 14:03:22 UTC`
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `just now`, `5 minutes ago`, `2 days ago`.
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>) -> String {
    format_relative_to(target, Utc::now())
}

fn format_relative_to(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(target);
    if elapsed.num_seconds().abs() < 60 {
        return "just now".to_string();
    }
    let suffix = if elapsed.num_seconds() > 0 { "ago" } else { "from now" };

    let (amount, unit) = if elapsed.num_days().abs() > 0 {
        (elapsed.num_days().abs(), "day")
    } else if elapsed.num_hours().abs() > 0 {
        (elapsed.num_hours().abs(), "hour")
    } else {
        (elapsed.num_minutes().abs(), "minute")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural} {suffix}")
}
