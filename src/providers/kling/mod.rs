//! Kling AI.
//!
//! Credit-based task model. Responses arrive either flat or wrapped in a
//! `{"code", "message", "data": {...}}` envelope; both are accepted. Finished
//! tasks carry a public video URL that needs no credential.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::models::{ContentMetadata, FetchedContent, GenerationSpec, PollReport};
use crate::core::provider::Provider;
use crate::error::{GateError, Result};
use crate::providers::{
    AdapterSettings, ContentAuth, ProgressScale, ProviderFeatures, VideoAdapter, download,
    missing_job_id, send_json, unknown_status, validate_with,
};
use crate::storage::credentials::Credential;

const PROVIDER: Provider = Provider::Kling;

fn wire_model(model: &str) -> &'static str {
    match model.trim() {
        "kling-1.0" => "kling-v1",
        _ => "kling-v1-5",
    }
}

/// Strip the optional `data` envelope and decode the task.
fn unwrap_envelope<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    let inner = match value {
        serde_json::Value::Object(mut map) if map.get("data").is_some_and(serde_json::Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| GateError::ParseResponse {
        provider: PROVIDER.cli_name().to_string(),
        message: e.to_string(),
    })
}

/// Adapter for the Kling video generation API.
#[derive(Debug, Clone)]
pub struct KlingAdapter {
    client: Client,
    settings: AdapterSettings,
}

impl KlingAdapter {
    #[must_use]
    pub const fn new(client: Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }

    async fn task(&self, job_id: &str, credential: &Credential) -> Result<KlingTask> {
        let request = self
            .client
            .get(self.settings.url(&format!("videos/generations/{job_id}")))
            .bearer_auth(credential.expose());
        let value: serde_json::Value =
            send_json(PROVIDER, request, self.settings.request_timeout).await?;
        unwrap_envelope(value)
    }
}

#[async_trait]
impl VideoAdapter for KlingAdapter {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            max_duration_seconds: 10,
            aspect_ratios: &["16:9", "9:16", "1:1"],
            supports_seed: true,
            supports_fps: true,
        }
    }

    fn content_auth(&self) -> ContentAuth {
        ContentAuth::None
    }

    async fn validate(&self, credential: &Credential) -> Result<bool> {
        let request = self
            .client
            .get(self.settings.url("account"))
            .bearer_auth(credential.expose());
        validate_with(PROVIDER, request, self.settings.request_timeout).await
    }

    async fn submit(&self, spec: &GenerationSpec, credential: &Credential) -> Result<String> {
        self.features().check(PROVIDER, spec)?;
        let body = KlingCreateRequest::from_spec(spec);
        let request = self
            .client
            .post(self.settings.url("videos/generations"))
            .bearer_auth(credential.expose())
            .json(&body);
        let value: serde_json::Value =
            send_json(PROVIDER, request, self.settings.request_timeout).await?;
        let task: KlingTask = unwrap_envelope(value)?;
        task.task_id
            .or(task.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_job_id(PROVIDER))
    }

    async fn poll(&self, job_id: &str, credential: &Credential) -> Result<PollReport> {
        let task = self.task(job_id, credential).await?;
        if let Some(credits) = task.credits_consumed() {
            tracing::debug!(provider = %PROVIDER, job_id, credits, "kling credits consumed");
        }
        Ok(task.report(job_id))
    }

    async fn fetch(&self, job_id: &str, credential: &Credential) -> Result<FetchedContent> {
        let task = self.task(job_id, credential).await?;
        let result = task.task_result.unwrap_or_default();
        let url = result.video_url().ok_or_else(|| GateError::ContentRetrieval {
            provider: PROVIDER.cli_name().to_string(),
            message: format!("task {job_id} has no video url"),
        })?;
        let (bytes, content_type) =
            download(PROVIDER, self.client.get(url), self.settings.fetch_timeout).await?;
        Ok(FetchedContent {
            bytes,
            content_type,
            metadata: result.metadata(),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct KlingCreateRequest<'a> {
    prompt: &'a str,
    model: &'static str,
    duration: u32,
    aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<u32>,
}

impl<'a> KlingCreateRequest<'a> {
    fn from_spec(spec: &'a GenerationSpec) -> Self {
        Self {
            prompt: &spec.prompt,
            model: wire_model(&spec.model),
            duration: spec.duration_seconds,
            aspect_ratio: spec.effective_aspect_ratio(),
            seed: spec.seed,
            fps: spec.fps,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct KlingTask {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    task_status_msg: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    credits: Option<f64>,
    #[serde(default)]
    task_result: Option<KlingTaskResult>,
}

#[derive(Debug, Default, Deserialize)]
struct KlingTaskResult {
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    videos: Vec<KlingVideo>,
}

#[derive(Debug, Default, Deserialize)]
struct KlingVideo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<serde_json::Value>,
}

impl KlingTask {
    fn report(&self, job_id: &str) -> PollReport {
        let token = self.task_status.as_deref().unwrap_or("submitted");
        match token {
            "submitted" | "pending" | "running" | "processing" => {
                PollReport::processing(ProgressScale::Percent.percent(self.progress))
            }
            "succeed" | "success" => PollReport::completed(),
            "failed" => PollReport::failed(
                self.task_status_msg
                    .clone()
                    .unwrap_or_else(|| "generation failed".to_string()),
            ),
            other => unknown_status(PROVIDER, job_id, other),
        }
    }

    const fn credits_consumed(&self) -> Option<f64> {
        self.credits
    }
}

impl KlingTaskResult {
    fn video_url(&self) -> Option<String> {
        self.video_url
            .clone()
            .or_else(|| self.videos.first().and_then(|v| v.url.clone()))
    }

    fn metadata(&self) -> ContentMetadata {
        let duration_seconds = self.videos.first().and_then(|v| match &v.duration {
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        });
        ContentMetadata {
            duration_seconds,
            width: None,
            height: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CanonicalStatus;

    fn task(json: &str) -> KlingTask {
        unwrap_envelope(serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn request_shape() {
        let spec = GenerationSpec::new("kling-1.0", "a fox", 10).with_aspect_ratio("9:16");
        let body = serde_json::to_value(KlingCreateRequest::from_spec(&spec)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "prompt": "a fox",
                "model": "kling-v1",
                "duration": 10,
                "aspect_ratio": "9:16"
            })
        );
        let newer = GenerationSpec::new("kling-1.5", "a fox", 5);
        let body = serde_json::to_value(KlingCreateRequest::from_spec(&newer)).unwrap();
        assert_eq!(body["model"], "kling-v1-5");
        assert_eq!(body["aspect_ratio"], "16:9");
    }

    #[test]
    fn flat_and_enveloped_payloads() {
        let flat = task(r#"{"task_id": "t1", "task_status": "running"}"#);
        assert_eq!(flat.task_id.as_deref(), Some("t1"));

        let wrapped = task(
            r#"{"code": 0, "message": "SUCCEED", "data": {"task_id": "t2", "task_status": "succeed",
                "task_result": {"videos": [{"url": "https://cdn/k.mp4", "duration": "5.1"}]}}}"#,
        );
        assert_eq!(wrapped.report("t2").status, CanonicalStatus::Completed);
        let result = wrapped.task_result.unwrap();
        assert_eq!(result.video_url().as_deref(), Some("https://cdn/k.mp4"));
        assert_eq!(result.metadata().duration_seconds, Some(5.1));
    }

    #[test]
    fn status_vocabulary() {
        for token in ["submitted", "pending", "running", "processing"] {
            let report = task(&format!(r#"{{"task_status": "{token}"}}"#)).report("t");
            assert_eq!(report.status, CanonicalStatus::Processing);
        }
        assert_eq!(task(r#"{"task_status": "success"}"#).report("t").status, CanonicalStatus::Completed);
        let failed = task(r#"{"task_status": "failed", "task_status_msg": "risk control"}"#).report("t");
        assert_eq!(failed.status, CanonicalStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("risk control"));
    }

    #[test]
    fn direct_video_url_wins() {
        let result = task(r#"{"task_result": {"video_url": "https://cdn/a.mp4"}}"#)
            .task_result
            .unwrap();
        assert_eq!(result.video_url().as_deref(), Some("https://cdn/a.mp4"));
    }
}
