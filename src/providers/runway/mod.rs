//! Runway Gen-3 / Gen-4.
//!
//! Flat job model: `POST /generations` returns an id, `GET /generations/{id}`
//! reports status and, once finished, a pre-signed `output.url` that is
//! downloaded without credentials.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::models::{ContentMetadata, FetchedContent, GenerationSpec, PollReport};
use crate::core::provider::Provider;
use crate::error::{GateError, Result};
use crate::providers::{
    AdapterSettings, ContentAuth, ProgressScale, ProviderFeatures, VideoAdapter, download,
    missing_job_id, send_json, unknown_status, validate_with,
};
use crate::storage::credentials::Credential;

const PROVIDER: Provider = Provider::Runway;

/// Wire model name for a public model name.
fn wire_model(model: &str) -> &'static str {
    match model.trim() {
        "runway-gen4" => "gen4",
        _ => "gen3",
    }
}

/// Adapter for the Runway generations API.
#[derive(Debug, Clone)]
pub struct RunwayAdapter {
    client: Client,
    settings: AdapterSettings,
}

impl RunwayAdapter {
    #[must_use]
    pub const fn new(client: Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }

    async fn generation(&self, job_id: &str, credential: &Credential) -> Result<RunwayGeneration> {
        let request = self
            .client
            .get(self.settings.url(&format!("generations/{job_id}")))
            .bearer_auth(credential.expose());
        send_json(PROVIDER, request, self.settings.request_timeout).await
    }
}

#[async_trait]
impl VideoAdapter for RunwayAdapter {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            max_duration_seconds: 10,
            aspect_ratios: &["16:9", "9:16", "1:1", "4:3"],
            supports_seed: true,
            supports_fps: false,
        }
    }

    fn content_auth(&self) -> ContentAuth {
        ContentAuth::None
    }

    async fn validate(&self, credential: &Credential) -> Result<bool> {
        let request = self
            .client
            .get(self.settings.url("teams"))
            .bearer_auth(credential.expose());
        validate_with(PROVIDER, request, self.settings.request_timeout).await
    }

    async fn submit(&self, spec: &GenerationSpec, credential: &Credential) -> Result<String> {
        self.features().check(PROVIDER, spec)?;
        let body = RunwayCreateRequest::from_spec(spec);
        let request = self
            .client
            .post(self.settings.url("generations"))
            .bearer_auth(credential.expose())
            .json(&body);
        let created: RunwayGeneration =
            send_json(PROVIDER, request, self.settings.request_timeout).await?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_job_id(PROVIDER))
    }

    async fn poll(&self, job_id: &str, credential: &Credential) -> Result<PollReport> {
        Ok(self.generation(job_id, credential).await?.report(job_id))
    }

    async fn fetch(&self, job_id: &str, credential: &Credential) -> Result<FetchedContent> {
        let generation = self.generation(job_id, credential).await?;
        let url = generation.output_url().ok_or_else(|| GateError::ContentRetrieval {
            provider: PROVIDER.cli_name().to_string(),
            message: format!("generation {job_id} has no output url"),
        })?;
        let (bytes, content_type) =
            download(PROVIDER, self.client.get(url), self.settings.fetch_timeout).await?;
        Ok(FetchedContent {
            bytes,
            content_type,
            metadata: generation.metadata(),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct RunwayCreateRequest<'a> {
    prompt: &'a str,
    model: &'static str,
    duration: u32,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl<'a> RunwayCreateRequest<'a> {
    fn from_spec(spec: &'a GenerationSpec) -> Self {
        let resolution = spec.effective_resolution();
        Self {
            prompt: &spec.prompt,
            model: wire_model(&spec.model),
            duration: spec.duration_seconds,
            width: resolution.width,
            height: resolution.height,
            seed: spec.seed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunwayGeneration {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    /// Either `{"url": ..}` or a list of urls.
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl RunwayGeneration {
    fn report(&self, job_id: &str) -> PollReport {
        let token = self
            .status
            .as_deref()
            .unwrap_or("pending")
            .to_ascii_lowercase();
        match token.as_str() {
            "pending" | "queued" | "processing" | "running" | "throttled" => {
                PollReport::processing(ProgressScale::Fraction.percent(self.progress))
            }
            "succeeded" => PollReport::completed(),
            "failed" | "cancelled" => PollReport::failed(self.failure_reason()),
            other => unknown_status(PROVIDER, job_id, other),
        }
    }

    fn failure_reason(&self) -> String {
        if let Some(failure) = &self.failure {
            return failure.clone();
        }
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| value.to_string(), str::to_string),
            None => "generation failed".to_string(),
        }
    }

    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::Object(map) => map.get("url")?.as_str().map(str::to_string),
            serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn metadata(&self) -> ContentMetadata {
        let Some(serde_json::Value::Object(map)) = &self.output else {
            return ContentMetadata::default();
        };
        let dimension = |key: &str| {
            map.get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        ContentMetadata {
            duration_seconds: map.get("duration").and_then(serde_json::Value::as_f64),
            width: dimension("width"),
            height: dimension("height"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CanonicalStatus;

    fn generation(json: &str) -> RunwayGeneration {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_shape() {
        let spec = GenerationSpec::new("runway-gen4", "waves", 10)
            .with_aspect_ratio("1:1")
            .with_seed(7);
        let body = serde_json::to_value(RunwayCreateRequest::from_spec(&spec)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "prompt": "waves",
                "model": "gen4",
                "duration": 10,
                "width": 1024,
                "height": 1024,
                "seed": 7
            })
        );

        let unseeded = GenerationSpec::new("runway-gen3", "waves", 5);
        let body = serde_json::to_value(RunwayCreateRequest::from_spec(&unseeded)).unwrap();
        assert_eq!(body["model"], "gen3");
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn status_vocabulary() {
        for token in ["pending", "queued", "RUNNING", "processing"] {
            let report = generation(&format!(r#"{{"status": "{token}"}}"#)).report("g");
            assert_eq!(report.status, CanonicalStatus::Processing, "{token}");
        }
        assert_eq!(
            generation(r#"{"status": "SUCCEEDED"}"#).report("g").status,
            CanonicalStatus::Completed
        );
        let failed = generation(r#"{"status": "FAILED", "failure": "nsfw"}"#).report("g");
        assert_eq!(failed.status, CanonicalStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("nsfw"));
    }

    #[test]
    fn progress_is_a_fraction() {
        let report = generation(r#"{"status": "RUNNING", "progress": 0.5}"#).report("g");
        assert_eq!(report.progress, Some(50));
        let report = generation(r#"{"status": "RUNNING", "progress": 1}"#).report("g");
        assert_eq!(report.progress, Some(100));
    }

    #[test]
    fn output_url_shapes() {
        let object = generation(r#"{"output": {"url": "https://cdn/x.mp4", "duration": 5.0}}"#);
        assert_eq!(object.output_url().as_deref(), Some("https://cdn/x.mp4"));
        assert_eq!(object.metadata().duration_seconds, Some(5.0));

        let list = generation(r#"{"output": ["https://cdn/y.mp4"]}"#);
        assert_eq!(list.output_url().as_deref(), Some("https://cdn/y.mp4"));
        assert_eq!(list.metadata(), ContentMetadata::default());

        assert_eq!(generation("{}").output_url(), None);
    }
}
