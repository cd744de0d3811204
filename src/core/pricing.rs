//! Per-second pricing for video models.
//!
//! `cost = (base_cost + per_second * duration) * resolution_multiplier`,
//! rounded to 4 decimal places. The multiplier is the pixel count relative to
//! 1280x720, clamped to `[0.5, 2.0]`. Pure and deterministic: the same table
//! prices both the pre-submission estimate and the post-completion actual.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::core::models::{GenerationSpec, Resolution};
use crate::core::provider::Provider;
use crate::error::Result;

/// Pixel count the multiplier is relative to (1280x720).
pub const BASE_PIXELS: f64 = 921_600.0;

const MIN_MULTIPLIER: f64 = 0.5;
const MAX_MULTIPLIER: f64 = 2.0;

/// Rate for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelRate {
    /// USD per generated second.
    pub per_second: f64,
    /// Flat USD per generation.
    pub base_cost: f64,
    /// Whether larger frames cost proportionally more.
    pub scales_with_resolution: bool,
}

impl ModelRate {
    #[must_use]
    pub const fn per_second(per_second: f64) -> Self {
        Self {
            per_second,
            base_cost: 0.0,
            scales_with_resolution: true,
        }
    }

    /// Unrounded cost and the multiplier applied.
    fn price(&self, duration_seconds: f64, resolution: Option<Resolution>) -> (f64, f64) {
        let multiplier = if self.scales_with_resolution {
            resolution.map_or(1.0, resolution_multiplier)
        } else {
            1.0
        };
        let raw = self.per_second.mul_add(duration_seconds, self.base_cost) * multiplier;
        (raw, multiplier)
    }
}

/// Cost multiplier for a frame size.
#[must_use]
pub fn resolution_multiplier(resolution: Resolution) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let pixels = resolution.pixels() as f64;
    (pixels / BASE_PIXELS).clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

/// Round to 4 decimal places.
#[must_use]
pub fn round_usd(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Pre-submission estimate with its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub provider: Provider,
    pub model: String,
    pub estimated_cost_usd: f64,
    pub per_second_rate: f64,
    pub duration_seconds: u32,
    pub resolution: Resolution,
    pub resolution_multiplier: f64,
    pub base_cost_usd: f64,
    pub duration_cost_usd: f64,
    /// False when the model has no rate; the estimate is then 0.
    pub priced: bool,
}

/// One row of the rate table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEntry {
    pub provider: Provider,
    pub model: String,
    #[serde(flatten)]
    pub rate: ModelRate,
}

/// Rates keyed by provider and model.
#[derive(Debug, Clone)]
pub struct PricingTable {
    rates: HashMap<(Provider, String), ModelRate>,
    /// When these rates were last reviewed.
    pub effective_date: DateTime<Utc>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::current()
    }
}

impl PricingTable {
    /// Published rates. Runway and Kling bill in credits; their rates are
    /// USD approximations.
    #[must_use]
    pub fn current() -> Self {
        let mut table = Self {
            rates: HashMap::new(),
            effective_date: Utc
                .with_ymd_and_hms(2025, 10, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        };
        table.add_model(Provider::OpenAi, "sora-2", ModelRate::per_second(0.10));
        table.add_model(Provider::OpenAi, "sora-1", ModelRate::per_second(0.10));
        table.add_model(Provider::Runway, "runway-gen3", ModelRate::per_second(0.05));
        table.add_model(Provider::Runway, "runway-gen4", ModelRate::per_second(0.075));
        table.add_model(Provider::Kling, "kling-1.5", ModelRate::per_second(0.04));
        table.add_model(Provider::Kling, "kling-1.0", ModelRate::per_second(0.03));
        table
    }

    /// Empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
            effective_date: Utc::now(),
        }
    }

    /// Add or replace a rate.
    pub fn add_model(&mut self, provider: Provider, model: &str, rate: ModelRate) {
        self.rates.insert((provider, model.to_string()), rate);
    }

    /// Builder-style [`add_model`](Self::add_model).
    #[must_use]
    pub fn with_rate(mut self, provider: Provider, model: &str, rate: ModelRate) -> Self {
        self.add_model(provider, model, rate);
        self
    }

    #[must_use]
    pub fn rate(&self, provider: Provider, model: &str) -> Option<&ModelRate> {
        self.rates.get(&(provider, model.trim().to_string()))
    }

    /// Price a generation. `None` if the model has no rate.
    #[must_use]
    pub fn cost(
        &self,
        provider: Provider,
        model: &str,
        duration_seconds: f64,
        resolution: Option<Resolution>,
    ) -> Option<f64> {
        let rate = self.rate(provider, model)?;
        let (raw, _) = rate.price(duration_seconds, resolution);
        Some(round_usd(raw))
    }

    /// Estimate for a spec at its effective resolution.
    #[must_use]
    pub fn estimate(&self, provider: Provider, spec: &GenerationSpec) -> CostEstimate {
        let resolution = spec.effective_resolution();
        let duration = f64::from(spec.duration_seconds);
        let (rate, priced) = self
            .rate(provider, &spec.model)
            .map_or((ModelRate::per_second(0.0), false), |r| (*r, true));
        let (raw, multiplier) = rate.price(duration, Some(resolution));

        CostEstimate {
            provider,
            model: spec.model.clone(),
            estimated_cost_usd: round_usd(raw),
            per_second_rate: rate.per_second,
            duration_seconds: spec.duration_seconds,
            resolution,
            resolution_multiplier: multiplier,
            base_cost_usd: rate.base_cost,
            duration_cost_usd: round_usd(rate.per_second * duration),
            priced,
        }
    }

    /// Validate `spec`, route its model, and estimate it.
    ///
    /// # Errors
    ///
    /// `InvalidSpec` or `UnknownModel`.
    pub fn estimate_spec(&self, spec: &GenerationSpec) -> Result<CostEstimate> {
        spec.validate()?;
        let provider = Provider::for_model(&spec.model)?;
        Ok(self.estimate(provider, spec))
    }

    /// All rates, ordered by provider then model.
    #[must_use]
    pub fn entries(&self) -> Vec<PriceEntry> {
        let mut entries: Vec<PriceEntry> = self
            .rates
            .iter()
            .map(|((provider, model), rate)| PriceEntry {
                provider: *provider,
                model: model.clone(),
                rate: *rate,
            })
            .collect();
        entries.sort_by(|a, b| a.provider.cmp(&b.provider).then_with(|| a.model.cmp(&b.model)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_float_eq;

    #[test]
    fn sora_five_seconds_landscape() {
        let table = PricingTable::current();
        let spec = GenerationSpec::new("sora-2", "a cat", 5).with_aspect_ratio("16:9");
        let estimate = table.estimate(Provider::OpenAi, &spec);
        assert_float_eq!(estimate.estimated_cost_usd, 0.5);
        assert_float_eq!(estimate.per_second_rate, 0.10);
        assert_eq!(estimate.resolution, Resolution::new(1280, 720));
        assert!(estimate.priced);
    }

    #[test]
    fn kling_ten_seconds_default_resolution() {
        let table = PricingTable::current();
        let spec = GenerationSpec::new("kling-1.0", "a fox", 10);
        assert_float_eq!(table.estimate(Provider::Kling, &spec).estimated_cost_usd, 0.30);
    }

    #[test]
    fn multiplier_is_clamped() {
        assert_float_eq!(resolution_multiplier(Resolution::new(1280, 720)), 1.0);
        assert_float_eq!(resolution_multiplier(Resolution::new(720, 1280)), 1.0);
        assert_float_eq!(resolution_multiplier(Resolution::new(320, 240)), 0.5);
        assert_float_eq!(resolution_multiplier(Resolution::new(3840, 2160)), 2.0);
        let square = resolution_multiplier(Resolution::new(1024, 1024));
        assert!(square > 1.13 && square < 1.14);
    }

    #[test]
    fn cost_is_rounded_to_four_places() {
        let table = PricingTable::current();
        let cost = table
            .cost(Provider::OpenAi, "sora-2", 5.0, Some(Resolution::new(1024, 1024)))
            .unwrap();
        assert_float_eq!(cost, 0.5689);
    }

    #[test]
    fn unknown_model_has_no_cost() {
        let table = PricingTable::current();
        assert!(table.cost(Provider::OpenAi, "sora-9", 5.0, None).is_none());
        let estimate = table.estimate(Provider::OpenAi, &GenerationSpec::new("sora-9", "x", 5));
        assert!(!estimate.priced);
        assert_float_eq!(estimate.estimated_cost_usd, 0.0);
    }

    #[test]
    fn estimate_matches_actual_for_matching_metadata() {
        let table = PricingTable::current();
        for model in ["runway-gen3", "runway-gen4"] {
            let spec = GenerationSpec::new(model, "x", 7).with_aspect_ratio("9:16");
            let estimate = table.estimate(Provider::Runway, &spec);
            let actual = table
                .cost(Provider::Runway, model, 7.0, Some(spec.effective_resolution()))
                .unwrap();
            assert_float_eq!(estimate.estimated_cost_usd, actual);
        }
    }

    #[test]
    fn flat_rates_ignore_resolution() {
        let table = PricingTable::empty().with_rate(
            Provider::Kling,
            "kling-1.5",
            ModelRate {
                per_second: 0.04,
                base_cost: 0.1,
                scales_with_resolution: false,
            },
        );
        let cost = table
            .cost(Provider::Kling, "kling-1.5", 5.0, Some(Resolution::new(2560, 1080)))
            .unwrap();
        assert_float_eq!(cost, 0.3);
    }

    #[test]
    fn entries_are_sorted() {
        let entries = PricingTable::current().entries();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].provider, Provider::OpenAi);
        assert_eq!(entries[5].provider, Provider::Kling);
    }
}
