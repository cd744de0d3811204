//! Bounded status polling.
//!
//! A [`StatusPoller`] asks an adapter for a job's status every
//! `interval` until the provider reports a terminal status, the attempt
//! budget runs out, or the pipeline is cancelled. Transient failures
//! (network, 429, 5xx, per-call timeout) spend an attempt and nothing else.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::http::{DEFAULT_FETCH_TIMEOUT, DEFAULT_TIMEOUT};
use crate::core::models::{CanonicalStatus, GenerationRecord, Transition};
use crate::error::{GateError, Result};
use crate::providers::VideoAdapter;
use crate::storage::credentials::CredentialStore;
use crate::storage::records::RecordStore;

/// A provider's retry-after hint stretches one wait to at most this many intervals.
const RETRY_AFTER_INTERVALS: u32 = 4;

/// Timing budget for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each status check.
    pub interval: Duration,
    /// Status checks before giving up.
    pub max_attempts: u32,
    /// Limit for each submit/status call.
    pub request_timeout: Duration,
    /// Limit for the content download.
    pub fetch_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            request_timeout: DEFAULT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl PollPolicy {
    /// Same timeouts, different cadence.
    #[must_use]
    pub const fn with_budget(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Longest single wait a retry-after hint can impose.
    #[must_use]
    pub const fn max_retry_wait(&self) -> Duration {
        self.interval.saturating_mul(RETRY_AFTER_INTERVALS)
    }

    /// Upper bound on how long polling can take, retry-after hints included.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_retry_wait()
            .saturating_add(self.request_timeout)
            .saturating_mul(self.max_attempts)
    }
}

/// How polling ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// Provider reports the video is ready.
    Completed,
    /// Provider declared the job failed.
    Failed { reason: String },
    /// Attempt budget exhausted.
    TimedOut {
        attempts: u32,
        last_error: Option<String>,
    },
    /// Token tripped, or the stored record went terminal or disappeared.
    Cancelled,
    /// A non-transient error (bad credential, rejected job id).
    Aborted(GateError),
}

/// Result of running a provider call under a cancellation token and a limit.
#[derive(Debug)]
pub enum Guarded<T> {
    Done(Result<T>),
    TimedOut,
    Cancelled,
}

/// Run `fut` until it finishes, `limit` elapses, or `cancel` trips.
pub async fn guarded<T>(
    cancel: &CancellationToken,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Guarded<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Guarded::Cancelled,
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(done) => Guarded::Done(done),
            Err(_) => Guarded::TimedOut,
        },
    }
}

/// Polls one provider job on behalf of one record.
pub struct StatusPoller<'a> {
    pub adapter: &'a dyn VideoAdapter,
    pub credentials: &'a dyn CredentialStore,
    pub records: &'a dyn RecordStore,
    pub events: &'a broadcast::Sender<GenerationRecord>,
    pub policy: PollPolicy,
    pub cancel: &'a CancellationToken,
}

impl StatusPoller<'_> {
    /// Poll `job_id` until a terminal outcome.
    pub async fn run(&self, generation_id: &str, key_ref: &str, job_id: &str) -> PollOutcome {
        let provider = self.adapter.provider();
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut last_progress: Option<u8> = None;
        let mut wait = self.policy.interval;

        while attempts < self.policy.max_attempts {
            if self.cancel.is_cancelled() || self.record_finished(generation_id) {
                return PollOutcome::Cancelled;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PollOutcome::Cancelled,
                () = tokio::time::sleep(wait) => {}
            }
            wait = self.policy.interval;
            attempts += 1;

            let credential = match self.credentials.credential(key_ref) {
                Ok(Some(credential)) => credential,
                Ok(None) => {
                    return PollOutcome::Aborted(GateError::AuthNotConfigured {
                        provider: provider.cli_name().to_string(),
                        key_ref: key_ref.to_string(),
                    });
                }
                Err(e) => return PollOutcome::Aborted(e),
            };
            let result = guarded(
                self.cancel,
                self.policy.request_timeout,
                self.adapter.poll(job_id, &credential),
            )
            .await;
            drop(credential);

            let report = match result {
                Guarded::Cancelled => return PollOutcome::Cancelled,
                Guarded::TimedOut => {
                    let err = GateError::RequestTimeout {
                        provider: provider.cli_name().to_string(),
                        seconds: self.policy.request_timeout.as_secs(),
                    };
                    tracing::debug!(generation_id, %provider, job_id, attempt = attempts, "status check timed out");
                    last_error = Some(err.to_string());
                    continue;
                }
                Guarded::Done(Err(e)) if e.is_transient() => {
                    tracing::debug!(generation_id, %provider, job_id, attempt = attempts, error = %e, "transient status error");
                    if let Some(retry_after) = e.retry_after() {
                        wait = wait.max(retry_after.min(self.policy.max_retry_wait()));
                    }
                    last_error = Some(e.to_string());
                    continue;
                }
                Guarded::Done(Err(e)) => return PollOutcome::Aborted(e),
                Guarded::Done(Ok(report)) => report,
            };

            tracing::debug!(
                generation_id,
                %provider,
                job_id,
                attempt = attempts,
                status = ?report.status,
                progress = ?report.progress,
                "status check"
            );

            match report.status {
                CanonicalStatus::Completed => return PollOutcome::Completed,
                CanonicalStatus::Failed => {
                    return PollOutcome::Failed {
                        reason: report
                            .failure_reason
                            .unwrap_or_else(|| "generation failed".to_string()),
                    };
                }
                CanonicalStatus::Processing => {
                    if let Some(progress) = report.progress.filter(|p| Some(*p) != last_progress) {
                        last_progress = Some(progress);
                        if !self.record_progress(generation_id, progress) {
                            return PollOutcome::Cancelled;
                        }
                    }
                }
            }
        }

        tracing::warn!(generation_id, %provider, job_id, attempts, "status polling budget exhausted");
        PollOutcome::TimedOut {
            attempts,
            last_error,
        }
    }

    /// True if someone else finalized or removed the record.
    fn record_finished(&self, generation_id: &str) -> bool {
        match self.records.get(generation_id) {
            Ok(Some(record)) => record.is_terminal(),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(generation_id, error = %e, "could not read record before status check");
                false
            }
        }
    }

    /// Persist a progress change. False if the record is already terminal.
    fn record_progress(&self, generation_id: &str, progress: u8) -> bool {
        match self.records.update(generation_id, &Transition::Progress { progress }) {
            Ok(outcome) if outcome.applied => {
                let _ = self.events.send(outcome.record);
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(generation_id, error = %e, "could not record progress");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{GenerationSpec, GenerationStatus, PollReport};
    use crate::core::provider::Provider;
    use crate::storage::credentials::MemoryCredentialStore;
    use crate::storage::records::MemoryRecordStore;
    use crate::test_utils::ScriptedAdapter;
    use chrono::Utc;

    struct Fixture {
        records: MemoryRecordStore,
        credentials: MemoryCredentialStore,
        events: broadcast::Sender<GenerationRecord>,
        cancel: CancellationToken,
        id: String,
    }

    fn fixture() -> Fixture {
        let records = MemoryRecordStore::new();
        let spec = GenerationSpec::new("sora-2", "a cat", 5);
        let record = GenerationRecord::new(Provider::OpenAi, spec, "openai", None, Utc::now());
        let id = record.id.clone();
        records.create(&record).unwrap();
        records
            .update(&id, &Transition::Submitted { provider_job_id: "job".into() })
            .unwrap();
        let (events, _) = broadcast::channel(16);
        Fixture {
            records,
            credentials: MemoryCredentialStore::new().with_key("openai", "sk-test"),
            events,
            cancel: CancellationToken::new(),
            id,
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy::default().with_budget(Duration::from_millis(1), 5)
    }

    async fn run(fx: &Fixture, adapter: &ScriptedAdapter, policy: PollPolicy) -> PollOutcome {
        StatusPoller {
            adapter,
            credentials: &fx.credentials,
            records: &fx.records,
            events: &fx.events,
            policy,
            cancel: &fx.cancel,
        }
        .run(&fx.id, "openai", "job")
        .await
    }

    #[tokio::test]
    async fn completes_and_records_progress() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Ok(PollReport::processing(Some(10))),
            Ok(PollReport::processing(Some(10))),
            Ok(PollReport::processing(Some(60))),
            Ok(PollReport::completed()),
        ]);
        let outcome = run(&fx, &adapter, fast()).await;
        assert!(matches!(outcome, PollOutcome::Completed));
        assert_eq!(adapter.poll_calls(), 4);
        assert_eq!(fx.records.get(&fx.id).unwrap().unwrap().progress, Some(60));
        // one credential lookup per status call
        assert_eq!(fx.credentials.lookups(), 4);
    }

    #[tokio::test]
    async fn transient_errors_consume_attempts() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Err(GateError::Network {
                provider: "openai".into(),
                message: "connection reset".into(),
            }),
            Ok(PollReport::completed()),
        ]);
        assert!(matches!(run(&fx, &adapter, fast()).await, PollOutcome::Completed));
        assert_eq!(adapter.poll_calls(), 2);
    }

    #[tokio::test]
    async fn budget_exhaustion_reports_last_error() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi).when_polls_exhausted(|| {
            Err(GateError::ProviderUnavailable {
                provider: "openai".into(),
                status_code: Some(503),
                message: "overloaded".into(),
            })
        });
        let policy = PollPolicy::default().with_budget(Duration::from_millis(1), 3);
        match run(&fx, &adapter, policy).await {
            PollOutcome::TimedOut {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap().contains("overloaded"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_terminal() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi)
            .with_polls(vec![Ok(PollReport::failed("moderation"))]);
        match run(&fx, &adapter, fast()).await {
            PollOutcome::Failed { reason } => assert_eq!(reason, "moderation"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_errors_abort() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![Err(
            GateError::AuthInvalid {
                provider: "openai".into(),
                reason: "revoked".into(),
            },
        )]);
        assert!(matches!(
            run(&fx, &adapter, fast()).await,
            PollOutcome::Aborted(GateError::AuthInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_polling() {
        let fx = fixture();
        fx.cancel.cancel();
        let adapter = ScriptedAdapter::new(Provider::OpenAi);
        assert!(matches!(run(&fx, &adapter, fast()).await, PollOutcome::Cancelled));
        assert_eq!(adapter.poll_calls(), 0);
    }

    #[tokio::test]
    async fn terminal_record_stops_polling() {
        let fx = fixture();
        fx.records.update(&fx.id, &Transition::Cancelled).unwrap();
        let adapter = ScriptedAdapter::new(Provider::OpenAi);
        assert!(matches!(run(&fx, &adapter, fast()).await, PollOutcome::Cancelled));
        assert_eq!(
            fx.records.get(&fx.id).unwrap().unwrap().status,
            GenerationStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn wait_is_interruptible() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi);
        let policy = PollPolicy::default().with_budget(Duration::from_secs(3600), 1);
        let cancel = fx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(5), run(&fx, &adapter, policy))
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Cancelled));
    }

    #[tokio::test]
    async fn retry_after_hint_is_capped() {
        let fx = fixture();
        let adapter = ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Err(GateError::RateLimited {
                provider: "openai".into(),
                retry_after: Some(Duration::from_secs(86_400)),
                message: "slow down".into(),
            }),
            Ok(PollReport::completed()),
        ]);
        let policy = PollPolicy::default().with_budget(Duration::from_millis(1), 3);
        let outcome = tokio::time::timeout(Duration::from_secs(3), run(&fx, &adapter, policy))
            .await
            .expect("retry-after hint stalled the poller");
        assert!(matches!(outcome, PollOutcome::Completed));
        assert_eq!(adapter.poll_calls(), 2);
    }

    #[test]
    fn max_wait_covers_capped_hints() {
        let policy = PollPolicy::default().with_budget(Duration::from_secs(2), 10);
        assert_eq!(policy.max_retry_wait(), Duration::from_secs(8));
        assert_eq!(
            policy.max_wait(),
            (Duration::from_secs(8) + policy.request_timeout) * 10
        );
    }

    #[test]
    fn default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 120);
        assert_eq!(policy.fetch_timeout, Duration::from_secs(300));
    }
}
