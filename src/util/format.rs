//! Number and text formatting for human output.

/// `$0.50`; sub-cent amounts keep four places.
#[must_use]
pub fn format_usd(value: f64) -> String {
    if value != 0.0 && value.abs() < 0.01 {
        format!("${value:.4}")
    } else {
        format!("${value:.2}")
    }
}

/// [`format_usd`], or `-` when unknown.
#[must_use]
pub fn format_usd_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), format_usd)
}

/// `42.0s`, `2m 05s`, `1h 03m`.
#[must_use]
pub fn format_seconds(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m {secs:02}s")
    }
}

#[must_use]
pub fn format_progress(progress: Option<u8>) -> String {
    progress.map_or_else(|| "-".to_string(), |p| format!("{p}%"))
}

/// Cut `text` to `max` chars, ending in `…` when shortened.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}
