//! Core data models for video generations.
//!
//! [`GenerationSpec`] is what the caller asks for; [`GenerationRecord`] is what
//! the gateway remembers about it. Records change only through
//! [`GenerationRecord::apply`], which enforces the lifecycle
//! `queued -> processing -> completed | failed`, with `cancelled` reachable
//! from either non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::provider::Provider;
use crate::error::{GateError, Result};

// =============================================================================
// Resolution
// =============================================================================

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 1280x720, the fallback when neither resolution nor aspect ratio is given.
    pub const DEFAULT: Self = Self::new(1280, 720);

    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Canonical resolution for a known aspect ratio.
    #[must_use]
    pub fn for_aspect_ratio(aspect_ratio: &str) -> Option<Self> {
        match aspect_ratio.trim() {
            "16:9" => Some(Self::new(1280, 720)),
            "9:16" => Some(Self::new(720, 1280)),
            "1:1" => Some(Self::new(1024, 1024)),
            "4:3" => Some(Self::new(1440, 1080)),
            "21:9" => Some(Self::new(2560, 1080)),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GateError::InvalidSpec(format!("resolution must be WIDTHxHEIGHT, got '{s}'"));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

// =============================================================================
// Generation Spec
// =============================================================================

/// A normalized video generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub model: String,
    pub prompt: String,
    pub duration_seconds: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

impl GenerationSpec {
    /// Minimal spec; optional fields unset.
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            duration_seconds,
            aspect_ratio: None,
            resolution: None,
            seed: None,
            fps: None,
        }
    }

    #[must_use]
    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    #[must_use]
    pub const fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Explicit resolution, else the aspect-ratio mapping, else 1280x720.
    #[must_use]
    pub fn effective_resolution(&self) -> Resolution {
        self.resolution
            .or_else(|| self.aspect_ratio.as_deref().and_then(Resolution::for_aspect_ratio))
            .unwrap_or(Resolution::DEFAULT)
    }

    /// Aspect ratio to send to providers that take one.
    ///
    /// Falls back to the orientation of the effective resolution.
    #[must_use]
    pub fn effective_aspect_ratio(&self) -> String {
        if let Some(ratio) = &self.aspect_ratio {
            return ratio.trim().to_string();
        }
        let res = self.effective_resolution();
        match res.width.cmp(&res.height) {
            std::cmp::Ordering::Greater => "16:9".to_string(),
            std::cmp::Ordering::Less => "9:16".to_string(),
            std::cmp::Ordering::Equal => "1:1".to_string(),
        }
    }

    /// Provider-independent checks run before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GateError::InvalidSpec("model must not be empty".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(GateError::InvalidSpec("prompt must not be empty".to_string()));
        }
        if self.duration_seconds == 0 {
            return Err(GateError::InvalidSpec(
                "duration_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(ratio) = &self.aspect_ratio {
            let valid = ratio
                .trim()
                .split_once(':')
                .is_some_and(|(w, h)| {
                    matches!((w.parse::<u32>(), h.parse::<u32>()), (Ok(w), Ok(h)) if w > 0 && h > 0)
                });
            if !valid {
                return Err(GateError::InvalidSpec(format!(
                    "aspect_ratio must look like W:H, got '{ratio}'"
                )));
            }
        }
        if self.fps == Some(0) {
            return Err(GateError::InvalidSpec("fps must be greater than 0".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle state of a generation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub const ALL: &'static [Self] = &[
        Self::Queued,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Edges of the lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing | Self::Failed | Self::Cancelled)
                | (
                    Self::Processing,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
        )
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|status| status.as_str() == lower)
            .copied()
            .ok_or_else(|| GateError::InvalidSpec(format!("unknown status '{s}'")))
    }
}

/// Provider status normalized to the three values the poller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    Processing,
    Completed,
    Failed,
}

/// One answer from an adapter's status call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub status: CanonicalStatus,
    pub progress: Option<u8>,
    pub failure_reason: Option<String>,
}

impl PollReport {
    #[must_use]
    pub const fn processing(progress: Option<u8>) -> Self {
        Self {
            status: CanonicalStatus::Processing,
            progress,
            failure_reason: None,
        }
    }

    #[must_use]
    pub const fn completed() -> Self {
        Self {
            status: CanonicalStatus::Completed,
            progress: Some(100),
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: CanonicalStatus::Failed,
            progress: None,
            failure_reason: Some(reason.into()),
        }
    }
}

// =============================================================================
// Content
// =============================================================================

/// Provider-reported properties of the finished video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Downloaded video bytes plus metadata.
#[derive(Clone, PartialEq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: ContentMetadata,
}

impl FetchedContent {
    /// File extension implied by the content type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            "image/gif" => "gif",
            _ => "mp4",
        }
    }
}

impl fmt::Debug for FetchedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedContent")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .finish()
    }
}

// =============================================================================
// Failure Kind
// =============================================================================

/// Machine-readable cause stored on failed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Validation,
    ProviderFailed,
    Timeout,
    ContentRetrieval,
    Transport,
    Interrupted,
}

impl FailureKind {
    pub const ALL: &'static [Self] = &[
        Self::Auth,
        Self::Validation,
        Self::ProviderFailed,
        Self::Timeout,
        Self::ContentRetrieval,
        Self::Transport,
        Self::Interrupted,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::ProviderFailed => "provider_failed",
            Self::Timeout => "timeout",
            Self::ContentRetrieval => "content_retrieval",
            Self::Transport => "transport",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| GateError::Storage(format!("unknown error kind '{s}'")))
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// A typed change to a generation record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The provider accepted the job.
    Submitted { provider_job_id: String },
    /// New progress figure from a status check.
    Progress { progress: u8 },
    /// Content stored and priced.
    Completed {
        content_location: String,
        metadata: ContentMetadata,
        cost_usd: Option<f64>,
    },
    Failed { kind: FailureKind, message: String },
    Cancelled,
}

impl Transition {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Status the record is in after this transition.
    ///
    /// `None` for progress updates, which keep the record in `processing`.
    #[must_use]
    pub const fn target_status(&self) -> Option<GenerationStatus> {
        match self {
            Self::Submitted { .. } => Some(GenerationStatus::Processing),
            Self::Progress { .. } => None,
            Self::Completed { .. } => Some(GenerationStatus::Completed),
            Self::Failed { .. } => Some(GenerationStatus::Failed),
            Self::Cancelled => Some(GenerationStatus::Cancelled),
        }
    }

    /// Failure transition built from the error that ended a pipeline.
    #[must_use]
    pub fn failed_from(err: &GateError) -> Self {
        Self::Failed {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Generation Record
// =============================================================================

/// Everything the gateway knows about one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub provider: Provider,
    pub model: String,
    pub spec: GenerationSpec,
    /// Credential ref used for every provider call on this record.
    pub key_ref: String,
    pub status: GenerationStatus,

    pub provider_job_id: Option<String>,
    pub content_location: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub progress: Option<u8>,

    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,

    pub estimated_cost_usd: Option<f64>,
    pub cost_usd: Option<f64>,
    pub generation_time_seconds: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// New record id: `gen_` followed by 12 hex chars of a v4 UUID.
#[must_use]
pub fn new_generation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("gen_{}", &hex[..12])
}

impl GenerationRecord {
    /// Fresh `queued` record.
    #[must_use]
    pub fn new(
        provider: Provider,
        spec: GenerationSpec,
        key_ref: impl Into<String>,
        estimated_cost_usd: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_generation_id(),
            provider,
            model: spec.model.clone(),
            spec,
            key_ref: key_ref.into(),
            status: GenerationStatus::Queued,
            provider_job_id: None,
            content_location: None,
            error: None,
            error_kind: None,
            progress: None,
            duration_seconds: None,
            width: None,
            height: None,
            estimated_cost_usd,
            cost_usd: None,
            generation_time_seconds: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition.
    ///
    /// Returns `Ok(true)` when the record changed and `Ok(false)` when the
    /// record is already terminal (writes after a terminal state are dropped).
    ///
    /// # Errors
    ///
    /// [`GateError::IllegalTransition`] when the edge is not in the lifecycle
    /// graph, e.g. `queued -> completed` or a second `Submitted`.
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> Result<bool> {
        if self.status.is_terminal() {
            return Ok(false);
        }

        let allowed = match transition.target_status() {
            Some(next) => self.status.can_transition_to(next),
            None => self.status == GenerationStatus::Processing,
        };
        if !allowed {
            return Err(GateError::IllegalTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: transition.name().to_string(),
            });
        }

        match transition {
            Transition::Submitted { provider_job_id } => {
                self.provider_job_id = Some(provider_job_id.clone());
                self.status = GenerationStatus::Processing;
            }
            Transition::Progress { progress } => {
                self.progress = Some((*progress).min(100));
            }
            Transition::Completed {
                content_location,
                metadata,
                cost_usd,
            } => {
                self.status = GenerationStatus::Completed;
                self.content_location = Some(content_location.clone());
                self.progress = Some(100);
                self.duration_seconds = metadata.duration_seconds;
                self.width = metadata.width;
                self.height = metadata.height;
                self.cost_usd = *cost_usd;
                self.finish(now);
            }
            Transition::Failed { kind, message } => {
                self.status = GenerationStatus::Failed;
                self.error = Some(message.clone());
                self.error_kind = Some(*kind);
                self.finish(now);
            }
            Transition::Cancelled => {
                self.status = GenerationStatus::Cancelled;
                self.finish(now);
            }
        }
        self.updated_at = now;
        Ok(true)
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        let elapsed = now.signed_duration_since(self.created_at);
        #[allow(clippy::cast_precision_loss)]
        let seconds = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
        self.generation_time_seconds = Some(seconds);
    }
}

// =============================================================================
// Record Filter
// =============================================================================

/// Filter and paging for record listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub provider: Option<Provider>,
    pub status: Option<GenerationStatus>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RecordFilter {
    #[must_use]
    pub fn matches(&self, record: &GenerationRecord) -> bool {
        self.provider.is_none_or(|p| p == record.provider)
            && self.status.is_none_or(|s| s == record.status)
    }
}
