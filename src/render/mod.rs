//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::models::GenerationRecord;
use crate::core::orchestrator::ResumeReport;
use crate::core::pricing::{CostEstimate, PriceEntry};
use crate::core::provider::Provider;
use crate::core::stats::UsageStats;
use crate::error::Result;
use crate::providers::{ContentAuth, ProviderFeatures};

/// Format flags shared by every renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub no_color: bool,
}

/// One row of `vidgate providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub provider: Provider,
    pub display_name: &'static str,
    pub enabled: bool,
    pub api_base: String,
    pub models: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<ProviderFeatures>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_auth: Option<ContentAuth>,
    pub key_ref: String,
    pub key_configured: bool,
}

/// One row of `vidgate keys list`.
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub key_ref: String,
    pub providers: Vec<Provider>,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Result of `keys set`, `keys validate`, or `keys delete`.
#[derive(Debug, Clone, Serialize)]
pub struct KeyAction {
    pub action: &'static str,
    pub key_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// `None` when validation was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

fn dispatch<T: Serialize + ?Sized>(
    command: &str,
    data: &T,
    opts: RenderOptions,
    human: impl FnOnce(&T, bool) -> String,
    md: impl FnOnce(&T) -> String,
) -> Result<String> {
    match opts.format {
        OutputFormat::Human => Ok(human(data, opts.no_color)),
        OutputFormat::Json => robot::render_json(command, data, opts.pretty),
        OutputFormat::Md => Ok(md(data)),
    }
}

pub fn render_record(command: &str, record: &GenerationRecord, opts: RenderOptions) -> Result<String> {
    dispatch(command, record, opts, human::record, robot::record_md)
}

pub fn render_records(records: &[GenerationRecord], opts: RenderOptions) -> Result<String> {
    dispatch("list", records, opts, human::records, robot::records_md)
}

pub fn render_estimate(estimate: &CostEstimate, opts: RenderOptions) -> Result<String> {
    dispatch("estimate", estimate, opts, human::estimate, robot::estimate_md)
}

pub fn render_stats(stats: &UsageStats, opts: RenderOptions) -> Result<String> {
    dispatch("stats", stats, opts, human::stats, robot::stats_md)
}

pub fn render_providers(rows: &[ProviderSummary], opts: RenderOptions) -> Result<String> {
    dispatch("providers", rows, opts, human::providers, robot::providers_md)
}

pub fn render_pricing(entries: &[PriceEntry], opts: RenderOptions) -> Result<String> {
    dispatch("pricing", entries, opts, human::pricing, robot::pricing_md)
}

pub fn render_keys(rows: &[KeySummary], opts: RenderOptions) -> Result<String> {
    dispatch("keys", rows, opts, human::keys, robot::keys_md)
}

pub fn render_key_action(action: &KeyAction, opts: RenderOptions) -> Result<String> {
    dispatch("keys", action, opts, human::key_action, robot::key_action_md)
}

pub fn render_resume(report: &ResumeReport, opts: RenderOptions) -> Result<String> {
    dispatch("resume", report, opts, human::resume, robot::resume_md)
}
