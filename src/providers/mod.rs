//! Provider adapters.
//!
//! Each submodule translates the normalized [`GenerationSpec`] into one
//! service's wire shape and maps that service's status vocabulary onto
//! [`CanonicalStatus`]. Adapters return typed results and never write
//! generation state themselves.

pub mod kling;
pub mod runway;
pub mod sora;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::core::http::{self, DEFAULT_FETCH_TIMEOUT, DEFAULT_TIMEOUT};
use crate::core::models::{FetchedContent, GenerationSpec, PollReport};
use crate::error::{GateError, Result};
use crate::storage::credentials::Credential;

pub use crate::core::models::CanonicalStatus;
pub use crate::core::provider::Provider;
pub use kling::KlingAdapter;
pub use runway::RunwayAdapter;
pub use sora::SoraAdapter;

// =============================================================================
// Capabilities
// =============================================================================

/// Whether the content download needs the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAuth {
    /// Send `Authorization: Bearer <key>` with the download.
    Bearer,
    /// Pre-signed URL; no credential.
    None,
}

/// What a provider accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFeatures {
    pub max_duration_seconds: u32,
    pub aspect_ratios: &'static [&'static str],
    pub supports_seed: bool,
    pub supports_fps: bool,
}

impl ProviderFeatures {
    /// Check a spec against these limits before any network call.
    ///
    /// # Errors
    ///
    /// [`GateError::InvalidSpec`] naming the offending field, or
    /// [`GateError::UnknownModel`] if `provider` does not serve the model.
    pub fn check(&self, provider: Provider, spec: &GenerationSpec) -> Result<()> {
        if !provider.models().contains(&spec.model.trim()) {
            return Err(GateError::UnknownModel(spec.model.clone()));
        }
        spec.validate()?;
        if spec.duration_seconds > self.max_duration_seconds {
            return Err(GateError::InvalidSpec(format!(
                "{} supports at most {}s, requested {}s",
                provider.display_name(),
                self.max_duration_seconds,
                spec.duration_seconds
            )));
        }
        match spec.aspect_ratio.as_deref().map(str::trim) {
            Some(ratio) if !self.aspect_ratios.contains(&ratio) => {
                Err(GateError::InvalidSpec(format!(
                    "{} does not support aspect ratio {ratio} (supported: {})",
                    provider.display_name(),
                    self.aspect_ratios.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Adapter Trait
// =============================================================================

/// One upstream video generation service.
#[async_trait]
pub trait VideoAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Public model names this adapter serves.
    fn models(&self) -> &'static [&'static str] {
        self.provider().models()
    }

    fn features(&self) -> ProviderFeatures;

    fn content_auth(&self) -> ContentAuth;

    /// Minimal authenticated call.
    ///
    /// `Ok(false)` when the provider rejects the credential; transport
    /// failures are returned as errors.
    async fn validate(&self, credential: &Credential) -> Result<bool>;

    /// Submit the job and return the provider's job id.
    async fn submit(&self, spec: &GenerationSpec, credential: &Credential) -> Result<String>;

    /// One status check.
    async fn poll(&self, job_id: &str, credential: &Credential) -> Result<PollReport>;

    /// Download the finished video. Only valid after `poll` reported completed.
    async fn fetch(&self, job_id: &str, credential: &Credential) -> Result<FetchedContent>;
}

// =============================================================================
// Shared HTTP plumbing
// =============================================================================

/// Endpoint and timeouts for one adapter.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub api_base: String,
    pub request_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl AdapterSettings {
    /// Production endpoint with default timeouts.
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            api_base: provider.default_api_base().to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, request: Duration, fetch: Duration) -> Self {
        self.request_timeout = request;
        self.fetch_timeout = fetch;
        self
    }

    /// `api_base` joined with `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Build the adapter for `provider`.
#[must_use]
pub fn build_adapter(
    provider: Provider,
    client: Client,
    settings: AdapterSettings,
) -> Arc<dyn VideoAdapter> {
    match provider {
        Provider::OpenAi => Arc::new(SoraAdapter::new(client, settings)),
        Provider::Runway => Arc::new(RunwayAdapter::new(client, settings)),
        Provider::Kling => Arc::new(KlingAdapter::new(client, settings)),
    }
}

/// Send with a per-request timeout and classify the response.
pub(crate) async fn send(
    provider: Provider,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Response> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| http::transport_error(provider, &e, timeout))?;
    http::check_status(provider, response).await
}

/// [`send`] and decode a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T> {
    let response = send(provider, request, timeout).await?;
    http::read_json(provider, response, timeout).await
}

/// Run a validation request: auth rejection is `false`, not an error.
pub(crate) async fn validate_with(
    provider: Provider,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<bool> {
    match send(provider, request, timeout).await {
        Ok(_) => Ok(true),
        Err(GateError::AuthInvalid { reason, .. }) => {
            tracing::debug!(provider = %provider, %reason, "credential rejected");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Download a body, returning bytes and the content type.
pub(crate) async fn download(
    provider: Provider,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<(Vec<u8>, String)> {
    let response = send(provider, request, timeout).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp4")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| http::transport_error(provider, &e, timeout))?;
    if bytes.is_empty() {
        return Err(GateError::ContentRetrieval {
            provider: provider.cli_name().to_string(),
            message: "empty response body".to_string(),
        });
    }
    Ok((bytes.to_vec(), content_type))
}

/// How a provider reports job progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressScale {
    /// `0.0..=1.0`
    Fraction,
    /// `0..=100`
    Percent,
}

impl ProgressScale {
    /// Whole percent, clamped to 100. `None` for missing or nonsense values.
    pub(crate) fn percent(self, value: Option<f64>) -> Option<u8> {
        let value = value?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let percent = match self {
            Self::Fraction => value * 100.0,
            Self::Percent => value,
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(percent.round().min(100.0) as u8)
    }
}

/// Log and map a status token nobody recognizes.
pub(crate) fn unknown_status(provider: Provider, job_id: &str, token: &str) -> PollReport {
    tracing::debug!(provider = %provider, job_id, status = token, "unknown status token, treating as processing");
    PollReport::processing(None)
}

/// Missing job id in a submission response.
pub(crate) fn missing_job_id(provider: Provider) -> GateError {
    GateError::ParseResponse {
        provider: provider.cli_name().to_string(),
        message: "submission response carried no job id".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_join_urls() {
        let settings = AdapterSettings::for_provider(Provider::OpenAi).with_api_base("http://x/v1/");
        assert_eq!(settings.url("/videos"), "http://x/v1/videos");
        assert_eq!(settings.url("videos/1"), "http://x/v1/videos/1");
    }

    #[test]
    fn feature_checks() {
        let features = ProviderFeatures {
            max_duration_seconds: 10,
            aspect_ratios: &["16:9", "9:16", "1:1"],
            supports_seed: true,
            supports_fps: false,
        };
        let ok = GenerationSpec::new("kling-1.5", "x", 10).with_aspect_ratio("9:16");
        assert!(features.check(Provider::Kling, &ok).is_ok());

        let too_long = GenerationSpec::new("kling-1.5", "x", 11);
        let err = features.check(Provider::Kling, &too_long).unwrap_err();
        assert!(err.to_string().contains("at most 10s"));

        let odd_ratio = GenerationSpec::new("kling-1.5", "x", 5).with_aspect_ratio("21:9");
        assert!(matches!(
            features.check(Provider::Kling, &odd_ratio),
            Err(GateError::InvalidSpec(_))
        ));
    }

    #[test]
    fn progress_scales() {
        assert_eq!(ProgressScale::Percent.percent(None), None);
        assert_eq!(ProgressScale::Percent.percent(Some(1.0)), Some(1));
        assert_eq!(ProgressScale::Percent.percent(Some(55.0)), Some(55));
        assert_eq!(ProgressScale::Percent.percent(Some(250.0)), Some(100));
        assert_eq!(ProgressScale::Percent.percent(Some(-1.0)), None);

        assert_eq!(ProgressScale::Fraction.percent(Some(0.42)), Some(42));
        assert_eq!(ProgressScale::Fraction.percent(Some(1.0)), Some(100));
        assert_eq!(ProgressScale::Fraction.percent(Some(f64::NAN)), None);
    }
}
