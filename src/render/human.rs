//! Human-readable output using `colored`.

use std::fmt::Write as _;

use colored::{ColoredString, Colorize};

use super::{KeyAction, KeySummary, ProviderSummary};
use crate::core::models::{GenerationRecord, GenerationStatus};
use crate::core::orchestrator::ResumeReport;
use crate::core::pricing::{CostEstimate, PriceEntry};
use crate::core::stats::UsageStats;
use crate::util::{
    format_progress, format_relative_time, format_seconds, format_timestamp, format_usd,
    format_usd_opt, truncate,
};

fn plain_or(no_color: bool, text: &str, style: impl FnOnce(&str) -> ColoredString) -> String {
    if no_color {
        text.to_string()
    } else {
        style(text).to_string()
    }
}

fn status_label(status: GenerationStatus, no_color: bool) -> String {
    let text = status.as_str();
    plain_or(no_color, text, |t| match status {
        GenerationStatus::Completed => t.green().bold(),
        GenerationStatus::Failed => t.red().bold(),
        GenerationStatus::Cancelled => t.yellow(),
        GenerationStatus::Processing => t.cyan(),
        GenerationStatus::Queued => t.dimmed(),
    })
}

fn heading(text: &str, no_color: bool) -> String {
    plain_or(no_color, text, |t| t.bold())
}

fn field(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<14} {value}");
}

/// One-line status update printed while `generate` waits.
#[must_use]
pub fn status_line(record: &GenerationRecord, no_color: bool) -> String {
    let mut line = format!("{} {}", record.id, status_label(record.status, no_color));
    if record.status == GenerationStatus::Processing {
        let _ = write!(line, " {}", format_progress(record.progress));
    }
    if let Some(error) = &record.error {
        let _ = write!(line, ": {error}");
    }
    line
}

#[must_use]
pub fn record(record: &GenerationRecord, no_color: bool) -> String {
    let mut out = format!(
        "{}  {}\n",
        heading(&record.id, no_color),
        status_label(record.status, no_color)
    );
    field(&mut out, "Model", format!("{} ({})", record.model, record.provider.display_name()));
    field(&mut out, "Prompt", truncate(&record.spec.prompt, 60));
    field(
        &mut out,
        "Request",
        format!("{}s @ {}", record.spec.duration_seconds, record.spec.effective_resolution()),
    );
    if !record.is_terminal() {
        field(&mut out, "Progress", format_progress(record.progress));
    }
    if let Some(job_id) = &record.provider_job_id {
        field(&mut out, "Job", job_id);
    }
    field(&mut out, "Estimate", format_usd_opt(record.estimated_cost_usd));
    if record.cost_usd.is_some() {
        field(&mut out, "Cost", format_usd_opt(record.cost_usd));
    }
    if let Some(location) = &record.content_location {
        field(&mut out, "Video", location);
    }
    if let (Some(width), Some(height)) = (record.width, record.height) {
        let length = record.duration_seconds.map_or_else(String::new, |d| format!(", {d:.1}s"));
        field(&mut out, "Output", format!("{width}x{height}{length}"));
    }
    if let Some(error) = &record.error {
        let kind = record.error_kind.map_or_else(String::new, |k| format!("[{k}] "));
        let message = format!("{kind}{error}");
        field(&mut out, "Error", plain_or(no_color, &message, |t| t.red()));
    }
    field(
        &mut out,
        "Created",
        format!("{} ({})", format_timestamp(record.created_at), format_relative_time(record.created_at)),
    );
    if let Some(seconds) = record.generation_time_seconds {
        field(&mut out, "Took", format_seconds(seconds));
    }
    out
}

#[must_use]
pub fn records(records: &[GenerationRecord], no_color: bool) -> String {
    if records.is_empty() {
        return "No generations.\n".to_string();
    }
    let mut out = heading(
        &format!("{:<18} {:<12} {:<11} {:>9}  {}", "ID", "MODEL", "STATUS", "COST", "CREATED"),
        no_color,
    );
    out.push('\n');
    for r in records {
        // pad before coloring so ANSI codes don't break alignment
        let status = format!("{:<11}", r.status.as_str());
        let status = plain_or(no_color, &status, |t| match r.status {
            GenerationStatus::Completed => t.green(),
            GenerationStatus::Failed => t.red(),
            GenerationStatus::Cancelled => t.yellow(),
            GenerationStatus::Processing => t.cyan(),
            GenerationStatus::Queued => t.dimmed(),
        });
        let _ = writeln!(
            out,
            "{:<18} {:<12} {status} {:>9}  {}",
            r.id,
            truncate(&r.model, 12),
            format_usd_opt(r.cost_usd.or(r.estimated_cost_usd)),
            format_relative_time(r.created_at)
        );
    }
    out
}

#[must_use]
pub fn estimate(estimate: &CostEstimate, no_color: bool) -> String {
    let total = format_usd(estimate.estimated_cost_usd);
    let mut out = format!(
        "{} {} ({})\n",
        heading("Estimate for", no_color),
        estimate.model,
        estimate.provider.display_name()
    );
    field(&mut out, "Total", plain_or(no_color, &total, |t| t.green().bold()));
    field(
        &mut out,
        "Rate",
        format!("{}/s x {}s", format_usd(estimate.per_second_rate), estimate.duration_seconds),
    );
    field(
        &mut out,
        "Resolution",
        format!("{} (x{:.2})", estimate.resolution, estimate.resolution_multiplier),
    );
    if estimate.base_cost_usd > 0.0 {
        field(&mut out, "Base", format_usd(estimate.base_cost_usd));
    }
    if !estimate.priced {
        let note = "no published rate for this model";
        field(&mut out, "Note", plain_or(no_color, note, |t| t.yellow()));
    }
    out
}

#[must_use]
pub fn stats(stats: &UsageStats, no_color: bool) -> String {
    let mut out = heading("Usage", no_color);
    out.push('\n');
    field(&mut out, "Generations", stats.total);
    field(
        &mut out,
        "Outcomes",
        format!(
            "{} completed, {} failed, {} cancelled, {} running",
            stats.completed, stats.failed, stats.cancelled, stats.in_progress
        ),
    );
    field(
        &mut out,
        "Success rate",
        stats.success_rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0)),
    );
    field(&mut out, "Spend", format_usd(stats.total_cost_usd));

    if !stats.by_provider.is_empty() {
        let _ = write!(out, "\n{}\n", heading("By provider", no_color));
        for (provider, b) in &stats.by_provider {
            let _ = writeln!(
                out,
                "  {:<10} {:>4} runs  {:>9}  avg {}",
                provider.cli_name(),
                b.count,
                format_usd(b.total_cost_usd),
                b.avg_generation_time_seconds.map_or_else(|| "-".to_string(), format_seconds)
            );
        }
    }
    if !stats.by_model.is_empty() {
        let _ = write!(out, "\n{}\n", heading("By model", no_color));
        for (model, b) in &stats.by_model {
            let _ = writeln!(
                out,
                "  {:<12} {:>4} runs  {:>9}  avg {}",
                model,
                b.count,
                format_usd(b.total_cost_usd),
                b.avg_generation_time_seconds.map_or_else(|| "-".to_string(), format_seconds)
            );
        }
    }
    if !stats.recent.is_empty() {
        let _ = write!(out, "\n{}\n", heading("Recent", no_color));
        for r in &stats.recent {
            let _ = writeln!(
                out,
                "  {:<18} {:<12} {}",
                r.id,
                r.model,
                status_label(r.status, no_color)
            );
        }
    }
    out
}

#[must_use]
pub fn providers(rows: &[ProviderSummary], no_color: bool) -> String {
    let mut out = String::new();
    for row in rows {
        let state = if row.enabled { "enabled" } else { "disabled" };
        let _ = writeln!(
            out,
            "{} ({}) {}",
            heading(row.display_name, no_color),
            row.provider,
            plain_or(no_color, state, |t| if row.enabled { t.green() } else { t.dimmed() })
        );
        field(&mut out, "Models", row.models.join(", "));
        if let Some(features) = &row.features {
            field(&mut out, "Max length", format!("{}s", features.max_duration_seconds));
            field(&mut out, "Aspect", features.aspect_ratios.join(", "));
        }
        let key = if row.key_configured {
            plain_or(no_color, "configured", |t| t.green())
        } else {
            plain_or(no_color, "missing", |t| t.red())
        };
        field(&mut out, "Key", format!("{} ({key})", row.key_ref));
        out.push('\n');
    }
    out
}

#[must_use]
pub fn pricing(entries: &[PriceEntry], no_color: bool) -> String {
    let mut out = heading(&format!("{:<10} {:<14} {:>10}", "PROVIDER", "MODEL", "PER SECOND"), no_color);
    out.push('\n');
    for e in entries {
        let _ = writeln!(
            out,
            "{:<10} {:<14} {:>10}",
            e.provider.cli_name(),
            e.model,
            format_usd(e.rate.per_second)
        );
    }
    out
}

#[must_use]
pub fn keys(rows: &[KeySummary], no_color: bool) -> String {
    let mut out = String::new();
    for k in rows {
        let state = if k.configured {
            plain_or(no_color, "configured", |t| t.green())
        } else {
            plain_or(no_color, "missing", |t| t.red())
        };
        let detail = match (k.source, &k.fingerprint) {
            (Some(source), Some(fp)) => format!(" via {source}, sha256:{fp}"),
            _ => String::new(),
        };
        let _ = writeln!(out, "{:<12} {state}{detail}", k.key_ref);
    }
    out
}

#[must_use]
pub fn key_action(action: &KeyAction, no_color: bool) -> String {
    let verdict = match action.valid {
        Some(true) => plain_or(no_color, "valid", |t| t.green()),
        Some(false) => plain_or(no_color, "rejected", |t| t.red()),
        None => "not checked".to_string(),
    };
    let mut line = format!("{} {}: {verdict}", action.action, action.key_ref);
    if action.stored {
        line.push_str(", stored");
    }
    if let Some(fp) = &action.fingerprint {
        let _ = write!(line, " (sha256:{fp})");
    }
    line.push('\n');
    line
}

#[must_use]
pub fn resume(report: &ResumeReport, no_color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", heading("Resumed:", no_color), report.resumed.len());
    for id in &report.resumed {
        let _ = writeln!(out, "  {id}");
    }
    let _ = writeln!(out, "{} {}", heading("Interrupted:", no_color), report.interrupted.len());
    for id in &report.interrupted {
        let _ = writeln!(out, "  {id}");
    }
    if !report.skipped.is_empty() {
        let _ = writeln!(out, "{} {}", heading("Skipped:", no_color), report.skipped.len());
    }
    out
}
