//! Robot-mode output (JSON and Markdown).
//!
//! JSON output is wrapped in a versioned envelope so scripts can detect
//! format changes.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{KeyAction, KeySummary, ProviderSummary};
use crate::core::models::GenerationRecord;
use crate::core::orchestrator::ResumeReport;
use crate::core::pricing::{CostEstimate, PriceEntry};
use crate::core::stats::UsageStats;
use crate::error::Result;

/// Envelope schema identifier.
pub const SCHEMA_VERSION: &str = "vidgate.v1";

/// Envelope around every JSON payload.
#[derive(Debug, Serialize)]
pub struct RobotOutput<'a, T: Serialize + ?Sized> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: &'a str,
    pub data: &'a T,
    pub errors: Vec<String>,
}

impl<'a, T: Serialize + ?Sized> RobotOutput<'a, T> {
    #[must_use]
    pub fn new(command: &'a str, data: &'a T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command,
            data,
            errors: Vec::new(),
        }
    }
}

/// Wrap `data` in the envelope and serialize it.
pub fn render_json<T: Serialize + ?Sized>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let output = RobotOutput::new(command, data);
    if pretty {
        Ok(serde_json::to_string_pretty(&output)?)
    } else {
        Ok(serde_json::to_string(&output)?)
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn usd(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

// Writing to a String never fails, so the `fmt::Result`s below are dropped.

#[must_use]
pub fn record_md(record: &GenerationRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## {}\n", record.id);
    let _ = writeln!(out, "- status: {}", record.status);
    let _ = writeln!(out, "- provider: {}", record.provider);
    let _ = writeln!(out, "- model: {}", record.model);
    let _ = writeln!(out, "- duration_seconds: {}", record.spec.duration_seconds);
    let _ = writeln!(out, "- progress: {}", opt(record.progress));
    let _ = writeln!(out, "- provider_job_id: {}", opt(record.provider_job_id.as_deref()));
    let _ = writeln!(out, "- estimated_cost_usd: {}", usd(record.estimated_cost_usd));
    let _ = writeln!(out, "- cost_usd: {}", usd(record.cost_usd));
    if let Some(location) = &record.content_location {
        let _ = writeln!(out, "- content_location: {location}");
    }
    if let Some(error) = &record.error {
        let _ = writeln!(out, "- error_kind: {}", opt(record.error_kind));
        let _ = writeln!(out, "- error: {error}");
    }
    let _ = writeln!(out, "- created_at: {}", record.created_at.to_rfc3339());
    if let Some(completed_at) = record.completed_at {
        let _ = writeln!(out, "- completed_at: {}", completed_at.to_rfc3339());
    }
    out
}

#[must_use]
pub fn records_md(records: &[GenerationRecord]) -> String {
    let mut out = String::from("| id | provider | model | status | cost_usd | created_at |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for r in records {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            r.id,
            r.provider,
            r.model,
            r.status,
            usd(r.cost_usd.or(r.estimated_cost_usd)),
            r.created_at.to_rfc3339()
        );
    }
    out
}

#[must_use]
pub fn estimate_md(estimate: &CostEstimate) -> String {
    let mut out = format!("## Estimate: {} ({})\n\n", estimate.model, estimate.provider);
    let _ = writeln!(out, "- estimated_cost_usd: {:.4}", estimate.estimated_cost_usd);
    let _ = writeln!(out, "- per_second_usd: {:.4}", estimate.per_second_rate);
    let _ = writeln!(out, "- duration_seconds: {}", estimate.duration_seconds);
    let _ = writeln!(out, "- resolution: {}", estimate.resolution);
    let _ = writeln!(out, "- resolution_multiplier: {:.2}", estimate.resolution_multiplier);
    if !estimate.priced {
        out.push_str("- note: no rate for this model\n");
    }
    out
}

#[must_use]
pub fn stats_md(stats: &UsageStats) -> String {
    let mut out = String::from("## Usage\n\n");
    let _ = writeln!(out, "- total: {}", stats.total);
    let _ = writeln!(out, "- completed: {}", stats.completed);
    let _ = writeln!(out, "- failed: {}", stats.failed);
    let _ = writeln!(out, "- cancelled: {}", stats.cancelled);
    let _ = writeln!(out, "- in_progress: {}", stats.in_progress);
    let _ = writeln!(out, "- total_cost_usd: {:.4}", stats.total_cost_usd);
    let _ = writeln!(
        out,
        "- success_rate: {}",
        stats.success_rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
    );

    out.push_str("\n### By model\n\n| model | count | completed | failed | cost_usd | avg_seconds |\n|---|---|---|---|---|---|\n");
    for (model, b) in &stats.by_model {
        let _ = writeln!(
            out,
            "| {model} | {} | {} | {} | {:.4} | {} |",
            b.count,
            b.completed,
            b.failed,
            b.total_cost_usd,
            b.avg_generation_time_seconds.map_or_else(|| "-".to_string(), |s| format!("{s:.1}"))
        );
    }
    out
}

#[must_use]
pub fn providers_md(rows: &[ProviderSummary]) -> String {
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(out, "## {} ({})\n", row.display_name, row.provider);
        let _ = writeln!(out, "- enabled: {}", row.enabled);
        let _ = writeln!(out, "- models: {}", row.models.join(", "));
        if let Some(features) = &row.features {
            let _ = writeln!(out, "- max_duration_seconds: {}", features.max_duration_seconds);
            let _ = writeln!(out, "- aspect_ratios: {}", features.aspect_ratios.join(", "));
        }
        let _ = writeln!(out, "- key_ref: {}", row.key_ref);
        let _ = writeln!(out, "- key_configured: {}\n", row.key_configured);
    }
    out
}

#[must_use]
pub fn pricing_md(entries: &[PriceEntry]) -> String {
    let mut out = String::from("| provider | model | per_second_usd | base_usd |\n|---|---|---|---|\n");
    for e in entries {
        let _ = writeln!(
            out,
            "| {} | {} | {:.4} | {:.4} |",
            e.provider, e.model, e.rate.per_second, e.rate.base_cost
        );
    }
    out
}

#[must_use]
pub fn keys_md(rows: &[KeySummary]) -> String {
    let mut out = String::from("| key_ref | configured | source | fingerprint |\n|---|---|---|---|\n");
    for k in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            k.key_ref,
            k.configured,
            opt(k.source),
            opt(k.fingerprint.as_deref())
        );
    }
    out
}

#[must_use]
pub fn key_action_md(action: &KeyAction) -> String {
    let mut out = format!("## keys {}: {}\n\n", action.action, action.key_ref);
    let _ = writeln!(out, "- valid: {}", opt(action.valid));
    let _ = writeln!(out, "- stored: {}", action.stored);
    if let Some(fp) = &action.fingerprint {
        let _ = writeln!(out, "- fingerprint: {fp}");
    }
    out
}

#[must_use]
pub fn resume_md(report: &ResumeReport) -> String {
    let mut out = String::from("## Resume\n\n");
    let _ = writeln!(out, "- resumed: {}", report.resumed.join(", "));
    let _ = writeln!(out, "- interrupted: {}", report.interrupted.join(", "));
    let _ = writeln!(out, "- skipped: {}", report.skipped.join(", "));
    out
}
