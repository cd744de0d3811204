//! OpenAI Videos API (Sora).
//!
//! - `POST /videos` creates a job
//! - `GET /videos/{id}` reports status, progress, and the rendered size
//! - `GET /videos/{id}/content` streams the MP4 and requires the bearer key

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::models::{
    ContentMetadata, FetchedContent, GenerationSpec, PollReport, Resolution,
};
use crate::core::provider::Provider;
use crate::error::Result;
use crate::providers::{
    AdapterSettings, ContentAuth, ProgressScale, ProviderFeatures, VideoAdapter, download,
    missing_job_id, send_json, unknown_status, validate_with,
};
use crate::storage::credentials::Credential;

const PROVIDER: Provider = Provider::OpenAi;

/// Adapter for the OpenAI Videos API.
#[derive(Debug, Clone)]
pub struct SoraAdapter {
    client: Client,
    settings: AdapterSettings,
}

impl SoraAdapter {
    #[must_use]
    pub const fn new(client: Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }

    async fn retrieve(&self, job_id: &str, credential: &Credential) -> Result<SoraVideo> {
        let request = self
            .client
            .get(self.settings.url(&format!("videos/{job_id}")))
            .bearer_auth(credential.expose());
        send_json(PROVIDER, request, self.settings.request_timeout).await
    }
}

#[async_trait]
impl VideoAdapter for SoraAdapter {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            max_duration_seconds: 20,
            aspect_ratios: &["16:9", "9:16", "1:1"],
            supports_seed: false,
            supports_fps: false,
        }
    }

    fn content_auth(&self) -> ContentAuth {
        ContentAuth::Bearer
    }

    async fn validate(&self, credential: &Credential) -> Result<bool> {
        let request = self
            .client
            .get(self.settings.url("models"))
            .bearer_auth(credential.expose());
        validate_with(PROVIDER, request, self.settings.request_timeout).await
    }

    async fn submit(&self, spec: &GenerationSpec, credential: &Credential) -> Result<String> {
        self.features().check(PROVIDER, spec)?;
        let body = SoraCreateRequest::from_spec(spec);
        let request = self
            .client
            .post(self.settings.url("videos"))
            .bearer_auth(credential.expose())
            .json(&body);
        let created: SoraVideo = send_json(PROVIDER, request, self.settings.request_timeout).await?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_job_id(PROVIDER))
    }

    async fn poll(&self, job_id: &str, credential: &Credential) -> Result<PollReport> {
        let video = self.retrieve(job_id, credential).await?;
        Ok(video.report(job_id))
    }

    async fn fetch(&self, job_id: &str, credential: &Credential) -> Result<FetchedContent> {
        let video = self.retrieve(job_id, credential).await?;
        let request = self
            .client
            .get(self.settings.url(&format!("videos/{job_id}/content")))
            .bearer_auth(credential.expose());
        let (bytes, content_type) = download(PROVIDER, request, self.settings.fetch_timeout).await?;
        Ok(FetchedContent {
            bytes,
            content_type,
            metadata: video.metadata(),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct SoraCreateRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    /// Whole seconds, sent as a string.
    seconds: String,
    /// `WIDTHxHEIGHT`.
    size: String,
}

impl<'a> SoraCreateRequest<'a> {
    fn from_spec(spec: &'a GenerationSpec) -> Self {
        Self {
            prompt: &spec.prompt,
            model: spec.model.trim(),
            seconds: spec.duration_seconds.to_string(),
            size: spec.effective_resolution().to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SoraVideo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    seconds: Option<serde_json::Value>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    error: Option<SoraError>,
}

#[derive(Debug, Default, Deserialize)]
struct SoraError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl SoraVideo {
    fn report(&self, job_id: &str) -> PollReport {
        let token = self.status.as_deref().unwrap_or("queued");
        match token {
            "queued" | "in_progress" | "processing" => {
                PollReport::processing(ProgressScale::Percent.percent(self.progress))
            }
            "completed" => PollReport::completed(),
            "failed" | "cancelled" => PollReport::failed(self.failure_reason(token)),
            other => unknown_status(PROVIDER, job_id, other),
        }
    }

    fn failure_reason(&self, token: &str) -> String {
        match &self.error {
            Some(SoraError {
                message: Some(message),
                code: Some(code),
            }) => format!("{message} ({code})"),
            Some(SoraError {
                message: Some(message),
                ..
            }) => message.clone(),
            Some(SoraError {
                code: Some(code), ..
            }) => code.clone(),
            _ if token == "cancelled" => "cancelled by provider".to_string(),
            _ => "generation failed".to_string(),
        }
    }

    fn metadata(&self) -> ContentMetadata {
        let duration_seconds = match &self.seconds {
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        };
        let size = self.size.as_deref().and_then(|s| s.parse::<Resolution>().ok());
        ContentMetadata {
            duration_seconds,
            width: size.map(|r| r.width),
            height: size.map(|r| r.height),
        }
    }
}
