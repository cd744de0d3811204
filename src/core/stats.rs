//! Usage statistics over stored generation records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::models::{GenerationRecord, GenerationStatus};
use crate::core::pricing::round_usd;
use crate::core::provider::Provider;

/// How many records `recent` keeps.
pub const RECENT_LIMIT: usize = 10;

/// Count, spend, and timing for one provider or model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub count: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_cost_usd: f64,
    /// Mean over terminal records that have a generation time.
    pub avg_generation_time_seconds: Option<f64>,
    #[serde(skip)]
    timed: usize,
    #[serde(skip)]
    time_sum: f64,
}

impl Breakdown {
    fn add(&mut self, record: &GenerationRecord) {
        self.count += 1;
        match record.status {
            GenerationStatus::Completed => self.completed += 1,
            GenerationStatus::Failed => self.failed += 1,
            _ => {}
        }
        self.total_cost_usd = round_usd(self.total_cost_usd + record.cost_usd.unwrap_or(0.0));
        if let Some(seconds) = record.generation_time_seconds {
            self.timed += 1;
            self.time_sum += seconds;
            #[allow(clippy::cast_precision_loss)]
            let avg = self.time_sum / self.timed as f64;
            self.avg_generation_time_seconds = Some(avg);
        }
    }
}

/// One line in the recent-generations list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentGeneration {
    pub id: String,
    pub provider: Provider,
    pub model: String,
    pub status: GenerationStatus,
    pub cost_usd: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&GenerationRecord> for RecentGeneration {
    fn from(record: &GenerationRecord) -> Self {
        Self {
            id: record.id.clone(),
            provider: record.provider,
            model: record.model.clone(),
            status: record.status,
            cost_usd: record.cost_usd,
            created_at: record.created_at,
        }
    }
}

/// Totals and breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub in_progress: usize,
    pub total_cost_usd: f64,
    /// `completed / (completed + failed)`; `None` before anything finished.
    pub success_rate: Option<f64>,
    pub by_provider: BTreeMap<Provider, Breakdown>,
    pub by_model: BTreeMap<String, Breakdown>,
    /// Newest first.
    pub recent: Vec<RecentGeneration>,
}

/// Aggregate `records`, which must be ordered newest first.
#[must_use]
pub fn compute(records: &[GenerationRecord]) -> UsageStats {
    let mut stats = UsageStats {
        total: records.len(),
        ..UsageStats::default()
    };

    for record in records {
        match record.status {
            GenerationStatus::Completed => stats.completed += 1,
            GenerationStatus::Failed => stats.failed += 1,
            GenerationStatus::Cancelled => stats.cancelled += 1,
            GenerationStatus::Queued | GenerationStatus::Processing => stats.in_progress += 1,
        }
        stats.total_cost_usd += record.cost_usd.unwrap_or(0.0);
        stats.by_provider.entry(record.provider).or_default().add(record);
        stats
            .by_model
            .entry(record.model.clone())
            .or_default()
            .add(record);
    }

    stats.total_cost_usd = round_usd(stats.total_cost_usd);
    let finished = stats.completed + stats.failed;
    if finished > 0 {
        #[allow(clippy::cast_precision_loss)]
        let rate = stats.completed as f64 / finished as f64;
        stats.success_rate = Some(rate);
    }
    stats.recent = records
        .iter()
        .take(RECENT_LIMIT)
        .map(RecentGeneration::from)
        .collect();
    stats
}
