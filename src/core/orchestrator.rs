//! Generation lifecycle.
//!
//! The [`Orchestrator`] owns every generation's state machine:
//!
//! ```text
//! queued ──submit ok──▶ processing ──poll completed + fetch ok──▶ completed
//!   │                       │
//!   ├──submit error──▶ failed ◀──poll failed / fetch error / budget exhausted
//!   │                       │
//!   └──────cancel──────▶ cancelled ◀──cancel
//! ```
//!
//! Each generation runs as one tokio task with its own cancellation token
//! (a child of the orchestrator's shutdown token). All record writes go
//! through [`RecordStore::update`]; once a record is terminal, later writes
//! are dropped, which is what makes `cancel` race-free against a pipeline
//! finishing at the same moment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::models::{
    FailureKind, GenerationRecord, GenerationSpec, GenerationStatus, RecordFilter, Resolution,
    Transition,
};
use crate::core::poller::{Guarded, PollOutcome, PollPolicy, StatusPoller, guarded};
use crate::core::pricing::{CostEstimate, PricingTable};
use crate::core::provider::{Provider, ProviderRegistry};
use crate::core::stats::{self, UsageStats};
use crate::error::{GateError, Result};
use crate::providers::VideoAdapter;
use crate::storage::blobs::BlobStore;
use crate::storage::credentials::{Credential, CredentialStore};
use crate::storage::records::RecordStore;

const EVENT_CAPACITY: usize = 256;
/// How often `wait` re-reads a record that no local pipeline is driving.
const WAIT_REFRESH: Duration = Duration::from_millis(500);

/// Where a pipeline starts.
#[derive(Debug, Clone)]
enum Start {
    Submit,
    Resume { job_id: String },
}

struct ActivePipeline {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    registry: ProviderRegistry,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    credentials: Arc<dyn CredentialStore>,
    pricing: PricingTable,
    policy: PollPolicy,
    active: Mutex<HashMap<String, ActivePipeline>>,
    shutdown: CancellationToken,
    events: broadcast::Sender<GenerationRecord>,
}

/// Outcome of [`Orchestrator::resume_pending`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResumeReport {
    /// Processing generations whose polling restarted.
    pub resumed: Vec<String>,
    /// Queued generations failed as `interrupted`.
    pub interrupted: Vec<String>,
    /// Left alone because their provider is disabled or already active.
    pub skipped: Vec<String>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    registry: ProviderRegistry,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    credentials: Arc<dyn CredentialStore>,
    pricing: PricingTable,
    policy: PollPolicy,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    #[must_use]
    pub const fn policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Orchestrator {
            inner: Arc::new(Inner {
                registry: self.registry,
                records: self.records,
                blobs: self.blobs,
                credentials: self.credentials,
                pricing: self.pricing,
                policy: self.policy,
                active: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                events,
            }),
        }
    }
}

/// Entry point for creating and tracking generations. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.inner.registry.providers())
            .field("policy", &self.inner.policy)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder(
        registry: ProviderRegistry,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            records,
            blobs,
            credentials,
            pricing: PricingTable::current(),
            policy: PollPolicy::default(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingTable {
        &self.inner.pricing
    }

    #[must_use]
    pub fn policy(&self) -> PollPolicy {
        self.inner.policy
    }

    /// Record updates made by pipelines in this process.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationRecord> {
        self.inner.events.subscribe()
    }

    /// Price a spec without touching any provider.
    pub fn estimate(&self, spec: &GenerationSpec) -> Result<CostEstimate> {
        self.inner.pricing.estimate_spec(spec)
    }

    /// Validate `spec` and the credential behind `key_ref`, store a `queued`
    /// record, and start its pipeline.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` / `UnknownModel` / `ProviderDisabled` before anything
    ///   is stored.
    /// - `AuthNotConfigured` if `key_ref` resolves to nothing (no record).
    /// - `AuthInvalid` if the provider rejects the credential; a `failed`
    ///   record with kind `auth` is kept.
    pub async fn create(&self, spec: GenerationSpec, key_ref: &str) -> Result<GenerationRecord> {
        spec.validate()?;
        let (provider, adapter) = self.inner.registry.adapter_for_model(&spec.model)?;
        adapter.features().check(provider, &spec)?;

        let credential = self.inner.credential(provider, key_ref)?;
        let valid = match tokio::time::timeout(
            self.inner.policy.request_timeout,
            adapter.validate(&credential),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(GateError::RequestTimeout {
                    provider: provider.cli_name().to_string(),
                    seconds: self.inner.policy.request_timeout.as_secs(),
                });
            }
        };
        drop(credential);

        let estimate = self.inner.pricing.estimate(provider, &spec);
        let record = GenerationRecord::new(
            provider,
            spec,
            key_ref,
            estimate.priced.then_some(estimate.estimated_cost_usd),
            Utc::now(),
        );
        self.inner.records.create(&record)?;

        if !valid {
            let err = GateError::AuthInvalid {
                provider: provider.cli_name().to_string(),
                reason: format!("credential '{key_ref}' was rejected"),
            };
            tracing::warn!(generation_id = %record.id, %provider, key_ref, "credential rejected");
            self.inner.transition(&record.id, &Transition::failed_from(&err));
            return Err(err);
        }

        tracing::info!(
            generation_id = %record.id,
            %provider,
            model = %record.model,
            estimated_cost_usd = ?record.estimated_cost_usd,
            "generation queued"
        );
        let _ = self.inner.events.send(record.clone());
        Inner::start(&self.inner, &record.id, provider, Start::Submit);
        Ok(record)
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &str) -> Result<GenerationRecord> {
        self.inner
            .records
            .get(id)?
            .ok_or_else(|| GateError::NotFound(format!("generation {id}")))
    }

    /// Snapshot of matching records, newest first.
    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<GenerationRecord>> {
        self.inner.records.list(filter)
    }

    /// Move a queued or processing generation to `cancelled` and stop its
    /// pipeline. Terminal generations are returned unchanged.
    pub fn cancel(&self, id: &str) -> Result<GenerationRecord> {
        let outcome = self.inner.records.update(id, &Transition::Cancelled)?;
        if outcome.applied {
            tracing::info!(generation_id = id, "generation cancelled");
            let _ = self.inner.events.send(outcome.record.clone());
        }
        if let Some(pipeline) = self.inner.active()?.get(id) {
            pipeline.cancel.cancel();
        }
        Ok(outcome.record)
    }

    /// Stop any pipeline, then remove stored content and the record.
    pub async fn delete(&self, id: &str) -> Result<GenerationRecord> {
        let record = self.get(id)?;

        let pipeline = self.inner.active()?.remove(id);
        if let Some(pipeline) = pipeline {
            pipeline.cancel.cancel();
            let mut handle = pipeline.handle;
            if tokio::time::timeout(self.inner.policy.request_timeout, &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        // Re-read: the pipeline may have stored content before it stopped.
        let record = self.inner.records.get(id)?.unwrap_or(record);
        if let Some(location) = &record.content_location {
            self.inner.blobs.delete(location).await?;
        }
        self.inner.records.delete(id)?;
        tracing::info!(generation_id = id, "generation deleted");
        Ok(record)
    }

    /// Wait until `id` is terminal or `timeout` passes.
    ///
    /// # Errors
    /// `WaitTimeout` if the generation is still running when time runs out.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Result<GenerationRecord> {
        let mut updates = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let record = self.get(id)?;
            if record.is_terminal() {
                return Ok(record);
            }

            let until_refresh = tokio::time::sleep(WAIT_REFRESH);
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    return Err(GateError::WaitTimeout {
                        id: id.to_string(),
                        status: record.status.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                update = updates.recv() => {
                    if let Ok(update) = update {
                        if update.id == id && update.is_terminal() {
                            return Ok(update);
                        }
                    }
                }
                () = until_refresh => {}
            }
        }
    }

    /// Restart work left over from a previous process.
    ///
    /// `processing` records with a provider job id are polled again;
    /// `queued` records are failed as `interrupted` rather than resubmitted,
    /// since the provider may already have accepted them.
    pub fn resume_pending(&self) -> Result<ResumeReport> {
        let mut report = ResumeReport::default();

        let processing = self.inner.records.list(&RecordFilter {
            status: Some(GenerationStatus::Processing),
            ..RecordFilter::default()
        })?;
        for record in processing {
            if self.is_active(&record.id) || self.inner.registry.get(record.provider).is_none() {
                report.skipped.push(record.id);
                continue;
            }
            match record.provider_job_id.clone() {
                Some(job_id) => {
                    tracing::info!(generation_id = %record.id, provider = %record.provider, job_id, "resuming generation");
                    Inner::start(&self.inner, &record.id, record.provider, Start::Resume { job_id });
                    report.resumed.push(record.id);
                }
                None => {
                    self.inner.transition(&record.id, &interrupted());
                    report.interrupted.push(record.id);
                }
            }
        }

        let queued = self.inner.records.list(&RecordFilter {
            status: Some(GenerationStatus::Queued),
            ..RecordFilter::default()
        })?;
        for record in queued {
            if self.is_active(&record.id) {
                report.skipped.push(record.id);
                continue;
            }
            tracing::warn!(generation_id = %record.id, "queued generation was interrupted before submission");
            self.inner.transition(&record.id, &interrupted());
            report.interrupted.push(record.id);
        }

        Ok(report)
    }

    /// Stop every pipeline without writing `cancelled`. Unfinished records
    /// stay as they are for [`resume_pending`](Self::resume_pending).
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let pipelines: Vec<ActivePipeline> = match self.inner.active() {
            Ok(mut active) => active.drain().map(|(_, p)| p).collect(),
            Err(_) => Vec::new(),
        };
        for pipeline in pipelines {
            let mut handle = pipeline.handle;
            if tokio::time::timeout(Duration::from_secs(5), &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }

    /// Usage statistics over every stored record.
    pub fn stats(&self) -> Result<UsageStats> {
        let records = self.inner.records.list(&RecordFilter::default())?;
        Ok(stats::compute(&records))
    }

    /// Check a credential against `provider` without creating anything.
    pub async fn validate_credential(&self, provider: Provider, credential: &Credential) -> Result<bool> {
        let adapter = self
            .inner
            .registry
            .get(provider)
            .ok_or_else(|| GateError::ProviderDisabled(provider.cli_name().to_string()))?;
        match tokio::time::timeout(self.inner.policy.request_timeout, adapter.validate(credential)).await {
            Ok(result) => result,
            Err(_) => Err(GateError::RequestTimeout {
                provider: provider.cli_name().to_string(),
                seconds: self.inner.policy.request_timeout.as_secs(),
            }),
        }
    }

    #[must_use]
    pub fn is_active(&self, id: &str) -> bool {
        self.inner.active().is_ok_and(|active| active.contains_key(id))
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active().map_or(0, |active| active.len())
    }
}

fn interrupted() -> Transition {
    Transition::Failed {
        kind: FailureKind::Interrupted,
        message: "interrupted before submission; not resubmitted".to_string(),
    }
}

impl Inner {
    fn active(&self) -> Result<MutexGuard<'_, HashMap<String, ActivePipeline>>> {
        self.active
            .lock()
            .map_err(|_| GateError::Storage("pipeline table lock poisoned".to_string()))
    }

    fn credential(&self, provider: Provider, key_ref: &str) -> Result<Credential> {
        self.credentials
            .credential(key_ref)?
            .ok_or_else(|| GateError::AuthNotConfigured {
                provider: provider.cli_name().to_string(),
                key_ref: key_ref.to_string(),
            })
    }

    /// Apply a transition, broadcasting applied changes. Returns whether the
    /// record changed.
    fn transition(&self, id: &str, transition: &Transition) -> bool {
        match self.records.update(id, transition) {
            Ok(outcome) => {
                if outcome.applied {
                    let _ = self.events.send(outcome.record);
                }
                outcome.applied
            }
            Err(e) => {
                tracing::error!(generation_id = id, transition = transition.name(), error = %e, "record update failed");
                false
            }
        }
    }

    fn fail(&self, id: &str, err: &GateError) {
        tracing::warn!(generation_id = id, kind = %err.failure_kind(), error = %err, "generation failed");
        self.transition(id, &Transition::failed_from(err));
    }

    /// Spawn the pipeline for `id` unless one is already running.
    fn start(this: &Arc<Self>, id: &str, provider: Provider, start: Start) {
        let Ok(mut active) = this.active() else {
            return;
        };
        if active.contains_key(id) {
            tracing::debug!(generation_id = id, "pipeline already running");
            return;
        }

        let cancel = this.shutdown.child_token();
        let inner = Arc::clone(this);
        let task_id = id.to_string();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.run_pipeline(&task_id, provider, start, &task_cancel).await;
            if let Ok(mut active) = inner.active() {
                active.remove(&task_id);
            }
        });
        active.insert(id.to_string(), ActivePipeline { cancel, handle });
    }

    async fn run_pipeline(&self, id: &str, provider: Provider, start: Start, cancel: &CancellationToken) {
        let record = match self.records.get(id) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(generation_id = id, error = %e, "could not load record for pipeline");
                return;
            }
        };
        let Some(adapter) = self.registry.get(provider) else {
            self.fail(id, &GateError::ProviderDisabled(provider.cli_name().to_string()));
            return;
        };

        let job_id = match start {
            Start::Resume { job_id } => job_id,
            Start::Submit => match self.submit(&record, adapter.as_ref(), cancel).await {
                Some(job_id) => job_id,
                None => return,
            },
        };

        let poller = StatusPoller {
            adapter: adapter.as_ref(),
            credentials: self.credentials.as_ref(),
            records: self.records.as_ref(),
            events: &self.events,
            policy: self.policy,
            cancel,
        };
        match poller.run(id, &record.key_ref, &job_id).await {
            PollOutcome::Completed => {
                self.finalize(&record, adapter.as_ref(), &job_id, cancel).await;
            }
            PollOutcome::Failed { reason } => {
                let err = GateError::ProviderFailed {
                    provider: provider.cli_name().to_string(),
                    reason,
                };
                self.fail(id, &err);
            }
            PollOutcome::TimedOut { attempts, last_error } => {
                self.fail(id, &GateError::PollTimeout { attempts, last_error });
            }
            PollOutcome::Aborted(err) => self.fail(id, &err),
            PollOutcome::Cancelled => {
                tracing::debug!(generation_id = id, "pipeline stopped");
            }
        }
    }

    /// Submit and record the job id. `None` if the pipeline should stop.
    async fn submit(
        &self,
        record: &GenerationRecord,
        adapter: &dyn VideoAdapter,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let id = record.id.as_str();
        let credential = match self.credential(record.provider, &record.key_ref) {
            Ok(credential) => credential,
            Err(e) => {
                self.fail(id, &e);
                return None;
            }
        };

        let result = guarded(
            cancel,
            self.policy.request_timeout,
            adapter.submit(&record.spec, &credential),
        )
        .await;
        drop(credential);

        match result {
            Guarded::Cancelled => None,
            Guarded::TimedOut => {
                self.fail(
                    id,
                    &GateError::RequestTimeout {
                        provider: record.provider.cli_name().to_string(),
                        seconds: self.policy.request_timeout.as_secs(),
                    },
                );
                None
            }
            Guarded::Done(Err(e)) => {
                self.fail(id, &e);
                None
            }
            Guarded::Done(Ok(job_id)) => {
                let submitted = Transition::Submitted {
                    provider_job_id: job_id.clone(),
                };
                if !self.transition(id, &submitted) {
                    // cancelled while the submit call was in flight
                    tracing::info!(generation_id = id, job_id, "provider accepted a job for a finished generation");
                    return None;
                }
                tracing::info!(generation_id = id, provider = %record.provider, job_id, "generation submitted");
                Some(job_id)
            }
        }
    }

    /// Download, store, price, and complete.
    async fn finalize(
        &self,
        record: &GenerationRecord,
        adapter: &dyn VideoAdapter,
        job_id: &str,
        cancel: &CancellationToken,
    ) {
        let id = record.id.as_str();
        let provider = record.provider;
        let content_error = |message: String| GateError::ContentRetrieval {
            provider: provider.cli_name().to_string(),
            message,
        };

        if cancel.is_cancelled() {
            return;
        }
        let credential = match self.credential(provider, &record.key_ref) {
            Ok(credential) => credential,
            Err(e) => {
                self.fail(id, &content_error(e.to_string()));
                return;
            }
        };
        let fetched = guarded(cancel, self.policy.fetch_timeout, adapter.fetch(job_id, &credential)).await;
        drop(credential);

        let content = match fetched {
            Guarded::Cancelled => return,
            Guarded::TimedOut => {
                let message = format!(
                    "content download timed out after {}s",
                    self.policy.fetch_timeout.as_secs()
                );
                self.fail(id, &content_error(message));
                return;
            }
            Guarded::Done(Err(e)) => {
                let err = match e {
                    GateError::ContentRetrieval { .. } => e,
                    other => content_error(other.to_string()),
                };
                self.fail(id, &err);
                return;
            }
            Guarded::Done(Ok(content)) => content,
        };
        if cancel.is_cancelled() {
            return;
        }

        let location = match self.blobs.put(id, &content).await {
            Ok(location) => location,
            Err(e) => {
                self.fail(id, &content_error(format!("could not store content: {e}")));
                return;
            }
        };

        let metadata = content.metadata;
        let duration = metadata
            .duration_seconds
            .unwrap_or_else(|| f64::from(record.spec.duration_seconds));
        let resolution = match (metadata.width, metadata.height) {
            (Some(width), Some(height)) => Resolution::new(width, height),
            _ => record.spec.effective_resolution(),
        };
        let cost_usd = self
            .pricing
            .cost(provider, &record.model, duration, Some(resolution));

        let completed = Transition::Completed {
            content_location: location.clone(),
            metadata,
            cost_usd,
        };
        if self.transition(id, &completed) {
            tracing::info!(generation_id = id, %provider, job_id, location, cost_usd = ?cost_usd, "generation completed");
        } else {
            // lost the race with cancel; drop the orphaned file
            if let Err(e) = self.blobs.delete(&location).await {
                tracing::warn!(generation_id = id, error = %e, "could not remove content for cancelled generation");
            }
        }
    }
}
