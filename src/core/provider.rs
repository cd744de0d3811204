//! Provider tags and the adapter registry.
//!
//! [`Provider`] is a closed set of upstream services; `Provider::for_model`
//! is a pure lookup. [`ProviderRegistry`] is built once and maps each tag to
//! the adapter that talks to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::Client;

use crate::error::{GateError, Result};
use crate::providers::{AdapterSettings, VideoAdapter, build_adapter};
use crate::storage::config::ResolvedConfig;

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported video generation services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    /// OpenAI Videos API (Sora).
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "runway")]
    Runway,
    #[serde(rename = "kling")]
    Kling,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::OpenAi, Self::Runway, Self::Kling];

    /// CLI / storage name for this provider.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Runway => "runway",
            Self::Kling => "kling",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI Sora",
            Self::Runway => "Runway",
            Self::Kling => "Kling AI",
        }
    }

    /// Public model names routed to this provider.
    #[must_use]
    pub const fn models(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["sora-2", "sora-1"],
            Self::Runway => &["runway-gen3", "runway-gen4"],
            Self::Kling => &["kling-1.5", "kling-1.0"],
        }
    }

    /// Production API base URL.
    #[must_use]
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Runway => "https://api.runwayml.com/v1",
            Self::Kling => "https://api.klingai.com/v1",
        }
    }

    /// Key ref used when the config does not name one.
    #[must_use]
    pub const fn default_key_ref(self) -> &'static str {
        self.cli_name()
    }

    /// Parse from CLI argument.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        let lower = if lower == "sora" { "openai".to_string() } else { lower };
        Self::ALL
            .iter()
            .find(|p| p.cli_name() == lower)
            .copied()
            .ok_or_else(|| GateError::Config(format!("unknown provider '{name}'")))
    }

    /// Provider that serves `model`.
    ///
    /// # Errors
    ///
    /// [`GateError::UnknownModel`] when no provider lists the model.
    pub fn for_model(model: &str) -> Result<Self> {
        let model = model.trim();
        Self::ALL
            .iter()
            .find(|p| p.models().contains(&model))
            .copied()
            .ok_or_else(|| GateError::UnknownModel(model.to_string()))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl std::str::FromStr for Provider {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_cli_name(s)
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Adapters keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn VideoAdapter>>,
}

impl ProviderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn VideoAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Add or replace the adapter for `adapter.provider()`.
    pub fn register(&mut self, adapter: Arc<dyn VideoAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn VideoAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Resolve the adapter that serves `model`.
    ///
    /// # Errors
    ///
    /// [`GateError::UnknownModel`] for unrouted models and
    /// [`GateError::ProviderDisabled`] when the provider has no adapter.
    pub fn adapter_for_model(&self, model: &str) -> Result<(Provider, Arc<dyn VideoAdapter>)> {
        let provider = Provider::for_model(model)?;
        self.get(provider)
            .map(|adapter| (provider, adapter))
            .ok_or_else(|| GateError::ProviderDisabled(provider.cli_name().to_string()))
    }

    /// Registered providers in display order.
    #[must_use]
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// One adapter per enabled provider, sharing `client`.
    #[must_use]
    pub fn from_config(config: &ResolvedConfig, client: &Client) -> Self {
        let mut registry = Self::new();
        for &provider in Provider::ALL {
            let settings = config.provider(provider);
            if !settings.enabled {
                tracing::debug!(%provider, "provider disabled by config");
                continue;
            }
            let adapter_settings = AdapterSettings::for_provider(provider)
                .with_api_base(settings.api_base_or_default(provider))
                .with_timeouts(config.request_timeout, config.fetch_timeout);
            registry.register(build_adapter(provider, client.clone(), adapter_settings));
        }
        registry
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
