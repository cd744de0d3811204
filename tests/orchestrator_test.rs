//! Generation lifecycle through the orchestrator with scripted adapters.
//!
//! Covers:
//! - submit, poll, fetch, store, and price on the happy path
//! - provider failure, poll budget exhaustion, and download failure
//! - cancel and delete while a pipeline is running
//! - credential rejection
//! - shutdown followed by resume in a fresh orchestrator
//! - the SQLite and filesystem stores end to end

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vidgate::core::models::{
    CanonicalStatus, FailureKind, GenerationRecord, GenerationStatus, PollReport, RecordFilter,
};
use vidgate::core::orchestrator::Orchestrator;
use vidgate::core::poller::PollPolicy;
use vidgate::core::provider::{Provider, ProviderRegistry};
use vidgate::error::GateError;
use vidgate::providers::VideoAdapter;
use vidgate::storage::blobs::{BlobStore, FsBlobStore, MemoryBlobStore};
use vidgate::storage::credentials::MemoryCredentialStore;
use vidgate::storage::records::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use vidgate::{ScriptedAdapter, TestDir, assert_float_eq, make_test_spec};

use common::logger::TestLogger;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    orchestrator: Orchestrator,
    adapter: Arc<ScriptedAdapter>,
    records: Arc<MemoryRecordStore>,
    blobs: Arc<MemoryBlobStore>,
}

fn fast(max_attempts: u32) -> PollPolicy {
    PollPolicy::default().with_budget(Duration::from_millis(1), max_attempts)
}

fn harness_with(adapter: ScriptedAdapter, records: Arc<MemoryRecordStore>, policy: PollPolicy) -> Harness {
    let adapter = Arc::new(adapter);
    let registry = ProviderRegistry::new().with_adapter(Arc::clone(&adapter) as Arc<dyn VideoAdapter>);
    let blobs = Arc::new(MemoryBlobStore::new());
    let credentials = MemoryCredentialStore::new()
        .with_key("openai", "sk-test")
        .with_key("runway", "rw-test");
    let orchestrator = Orchestrator::builder(
        registry,
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::clone(&blobs) as Arc<dyn BlobStore>,
        Arc::new(credentials),
    )
    .policy(policy)
    .build();
    Harness {
        orchestrator,
        adapter,
        records,
        blobs,
    }
}

fn harness(adapter: ScriptedAdapter, policy: PollPolicy) -> Harness {
    harness_with(adapter, Arc::new(MemoryRecordStore::new()), policy)
}

/// Poll `get` until `done` holds or five seconds pass.
async fn until(orch: &Orchestrator, id: &str, done: impl Fn(&GenerationRecord) -> bool) -> GenerationRecord {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let record = orch.get(id).unwrap();
        if done(&record) {
            return record;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition never held: {record:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn sora_generation_completes_and_is_priced() {
    let (log, capture) = TestLogger::with_capture("sora_generation_completes_and_is_priced");
    log.phase("setup");
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Ok(PollReport::processing(Some(20))),
            Ok(PollReport::processing(Some(70))),
            Ok(PollReport::completed()),
        ]),
        fast(10),
    );

    log.phase("execute");
    let queued = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    assert_eq!(queued.status, GenerationStatus::Queued);
    assert_float_eq!(queued.estimated_cost_usd.unwrap(), 0.5);

    let done = h.orchestrator.wait(&queued.id, WAIT).await.unwrap();

    log.phase("verify");
    assert_eq!(done.status, GenerationStatus::Completed);
    assert_float_eq!(done.cost_usd.unwrap(), 0.5);
    assert_eq!(done.progress, Some(100));
    assert!(done.provider_job_id.as_deref().is_some_and(|j| j.starts_with("job_")));
    assert_eq!((done.width, done.height), (Some(1280), Some(720)));
    assert!(done.generation_time_seconds.is_some());
    assert!(done.completed_at.is_some());

    let location = done.content_location.clone().unwrap();
    assert_eq!(location, format!("memory://{}", done.id));
    assert!(h.blobs.bytes(&location).is_some());

    assert_eq!(h.adapter.submit_calls(), 1);
    assert_eq!(h.adapter.poll_calls(), 3);
    assert_eq!(h.adapter.fetch_calls(), 1);
    assert!(h.adapter.secrets_seen().iter().all(|s| s == "sk-test"));

    capture.assert_logged("generation completed");
    capture.assert_field_logged("provider", "openai");
    capture.assert_no_errors();
    assert!(!capture.contains_anywhere("sk-test"), "secret leaked into logs");
    log.finish_ok();
}

#[tokio::test]
async fn subscribers_see_every_status_change_in_order() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Ok(PollReport::processing(Some(50))),
            Ok(PollReport::completed()),
        ]),
        fast(10),
    );
    let mut updates = h.orchestrator.subscribe();

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    let mut statuses = Vec::new();
    while let Ok(update) = updates.try_recv() {
        if update.id == record.id {
            statuses.push((update.status, update.progress));
        }
    }
    assert_eq!(
        statuses,
        vec![
            (GenerationStatus::Queued, None),
            (GenerationStatus::Processing, None),
            (GenerationStatus::Processing, Some(50)),
            (GenerationStatus::Completed, Some(100)),
        ]
    );
}

#[tokio::test]
async fn transient_poll_errors_are_retried() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Err(GateError::ProviderUnavailable {
                provider: "openai".to_string(),
                status_code: Some(503),
                message: "overloaded".to_string(),
            }),
            Err(GateError::Network {
                provider: "openai".to_string(),
                message: "connection reset".to_string(),
            }),
            Ok(PollReport::completed()),
        ]),
        fast(5),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = h.orchestrator.wait(&record.id, WAIT).await.unwrap();
    assert_eq!(done.status, GenerationStatus::Completed);
    assert_eq!(h.adapter.poll_calls(), 3);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn provider_failure_is_recorded_without_fetching() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
            Ok(PollReport::processing(Some(10))),
            Ok(PollReport::failed("prompt violates content policy")),
        ]),
        fast(10),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.error_kind, Some(FailureKind::ProviderFailed));
    assert!(done.error.as_deref().unwrap().contains("content policy"));
    assert_eq!(done.cost_usd, None);
    assert_eq!(h.adapter.fetch_calls(), 0);
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn exhausted_poll_budget_is_a_timeout() {
    let (log, capture) = TestLogger::with_capture("exhausted_poll_budget_is_a_timeout");
    let h = harness(ScriptedAdapter::new(Provider::OpenAi), fast(3));

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.error_kind, Some(FailureKind::Timeout));
    assert!(done.error.as_deref().unwrap().contains("3 status checks"));
    assert_eq!(h.adapter.poll_calls(), 3);
    capture.assert_logged_at_level(tracing::Level::WARN, "status polling budget exhausted");
    log.finish_ok();
}

#[tokio::test]
async fn rejected_submission_fails_the_record() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_submit(|_| {
            Err(GateError::ProviderRejected {
                provider: "openai".to_string(),
                status_code: Some(400),
                message: "size not supported".to_string(),
            })
        }),
        fast(5),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.error_kind, Some(FailureKind::Validation));
    assert_eq!(done.provider_job_id, None);
    assert_eq!(h.adapter.poll_calls(), 0);
}

#[tokio::test]
async fn download_failure_is_content_retrieval() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi)
            .with_polls(vec![Ok(PollReport::completed())])
            .with_fetch(|job_id| {
                Err(GateError::Network {
                    provider: "openai".to_string(),
                    message: format!("reset while downloading {job_id}"),
                })
            }),
        fast(5),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.error_kind, Some(FailureKind::ContentRetrieval));
    assert_eq!(done.content_location, None);
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn rejected_credential_leaves_failed_auth_record() {
    let h = harness(ScriptedAdapter::new(Provider::OpenAi).with_validate(false), fast(5));

    let err = h
        .orchestrator
        .create(make_test_spec("sora-2", 5), "openai")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::AuthInvalid { .. }));
    assert_eq!(err.exit_code(), vidgate::ExitCode::AuthError);

    let records = h.orchestrator.list(&RecordFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, GenerationStatus::Failed);
    assert_eq!(records[0].error_kind, Some(FailureKind::Auth));
    assert_eq!(h.adapter.submit_calls(), 0);
}

#[tokio::test]
async fn unsupported_duration_is_rejected_before_any_call() {
    let h = harness(ScriptedAdapter::new(Provider::OpenAi), fast(5));

    let err = h
        .orchestrator
        .create(make_test_spec("sora-2", 60), "openai")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidSpec(_)));
    assert_eq!(h.adapter.validate_calls(), 0);
    assert!(h.records.list(&RecordFilter::default()).unwrap().is_empty());
}

// =============================================================================
// Cancel, delete, wait
// =============================================================================

#[tokio::test]
async fn cancel_stops_polling_and_is_idempotent() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi)
            .when_polls_exhausted(|| Ok(PollReport::processing(Some(5))))
            .with_poll_delay(Duration::from_millis(5)),
        PollPolicy::default().with_budget(Duration::from_millis(2), 10_000),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    until(&h.orchestrator, &record.id, |r| r.status == GenerationStatus::Processing).await;

    let cancelled = h.orchestrator.cancel(&record.id).unwrap();
    assert_eq!(cancelled.status, GenerationStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let polls_at_cancel = h.adapter.poll_calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.adapter.poll_calls() <= polls_at_cancel + 1);
    assert!(!h.orchestrator.is_active(&record.id));
    assert_eq!(h.adapter.fetch_calls(), 0);

    let again = h.orchestrator.cancel(&record.id).unwrap();
    assert_eq!(again.status, GenerationStatus::Cancelled);
    assert_eq!(again.updated_at, cancelled.updated_at);
}

#[tokio::test]
async fn completion_after_cancel_is_never_fetched() {
    let provider_done = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&provider_done);
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi)
            .when_polls_exhausted(move || {
                if done.load(Ordering::SeqCst) {
                    Ok(PollReport::completed())
                } else {
                    Ok(PollReport::processing(Some(40)))
                }
            })
            .with_poll_delay(Duration::from_millis(2)),
        PollPolicy::default().with_budget(Duration::from_millis(2), 10_000),
    );

    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    until(&h.orchestrator, &record.id, |r| r.progress == Some(40)).await;

    h.orchestrator.cancel(&record.id).unwrap();
    provider_done.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = h.orchestrator.get(&record.id).unwrap();
    assert_eq!(after.status, GenerationStatus::Cancelled);
    assert!(after.content_location.is_none());
    assert_eq!(h.adapter.fetch_calls(), 0);
    assert!(h.blobs.is_empty());
    assert!(!h.orchestrator.is_active(&record.id));
}

#[tokio::test]
async fn cancelling_a_finished_generation_changes_nothing() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![Ok(PollReport::completed())]),
        fast(5),
    );
    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    h.orchestrator.wait(&record.id, WAIT).await.unwrap();

    let after = h.orchestrator.cancel(&record.id).unwrap();
    assert_eq!(after.status, GenerationStatus::Completed);
    assert!(after.content_location.is_some());
}

#[tokio::test]
async fn delete_stops_pipeline_and_removes_content() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![Ok(PollReport::completed())]),
        fast(5),
    );
    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    h.orchestrator.wait(&record.id, WAIT).await.unwrap();
    assert_eq!(h.blobs.len(), 1);

    let deleted = h.orchestrator.delete(&record.id).await.unwrap();
    assert_eq!(deleted.status, GenerationStatus::Completed);
    assert!(h.blobs.is_empty());
    assert!(matches!(h.orchestrator.get(&record.id), Err(GateError::NotFound(_))));
    assert!(matches!(h.orchestrator.delete(&record.id).await, Err(GateError::NotFound(_))));
}

#[tokio::test]
async fn delete_while_processing() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi).with_poll_delay(Duration::from_millis(5)),
        PollPolicy::default().with_budget(Duration::from_millis(2), 10_000),
    );
    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    until(&h.orchestrator, &record.id, |r| r.status == GenerationStatus::Processing).await;

    h.orchestrator.delete(&record.id).await.unwrap();
    assert!(!h.orchestrator.is_active(&record.id));
    assert!(h.records.get(&record.id).unwrap().is_none());
}

#[tokio::test]
async fn wait_times_out_without_touching_the_record() {
    let h = harness(
        ScriptedAdapter::new(Provider::OpenAi),
        PollPolicy::default().with_budget(Duration::from_millis(5), 10_000),
    );
    let record = h.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();

    let err = h
        .orchestrator
        .wait(&record.id, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::WaitTimeout { .. }));
    assert!(!h.orchestrator.get(&record.id).unwrap().is_terminal());

    h.orchestrator.shutdown().await;
}

// =============================================================================
// Shutdown and resume
// =============================================================================

#[tokio::test]
async fn shutdown_then_resume_in_a_new_orchestrator() {
    let log = TestLogger::new("shutdown_then_resume_in_a_new_orchestrator");
    let records = Arc::new(MemoryRecordStore::new());

    log.phase("first process");
    let first = harness_with(
        ScriptedAdapter::new(Provider::OpenAi).with_submit(|_| Ok("video_resume".to_string())),
        Arc::clone(&records),
        PollPolicy::default().with_budget(Duration::from_millis(5), 10_000),
    );
    let record = first.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    until(&first.orchestrator, &record.id, |r| r.status == GenerationStatus::Processing).await;
    first.orchestrator.shutdown().await;
    assert_eq!(first.orchestrator.active_count(), 0);

    let left = records.get(&record.id).unwrap().unwrap();
    assert_eq!(left.status, GenerationStatus::Processing);
    assert_eq!(left.provider_job_id.as_deref(), Some("video_resume"));

    log.phase("second process");
    let second = harness_with(
        ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![Ok(PollReport::completed())]),
        Arc::clone(&records),
        fast(5),
    );
    let report = second.orchestrator.resume_pending().unwrap();
    assert_eq!(report.resumed, vec![record.id.clone()]);
    assert!(report.interrupted.is_empty());

    let done = second.orchestrator.wait(&record.id, WAIT).await.unwrap();
    assert_eq!(done.status, GenerationStatus::Completed);
    assert_eq!(second.adapter.submit_calls(), 0);
    assert_eq!(second.adapter.fetch_calls(), 1);
    log.finish_ok();
}

#[tokio::test]
async fn resume_skips_providers_without_an_adapter() {
    let records = Arc::new(MemoryRecordStore::new());
    let mut stranded = vidgate::make_test_record("runway-gen3");
    stranded
        .apply(
            &vidgate::core::models::Transition::Submitted {
                provider_job_id: "gen-1".to_string(),
            },
            chrono::Utc::now(),
        )
        .unwrap();
    records.create(&stranded).unwrap();

    let h = harness_with(ScriptedAdapter::new(Provider::OpenAi), records, fast(5));
    let report = h.orchestrator.resume_pending().unwrap();
    assert_eq!(report.skipped, vec![stranded.id.clone()]);
    assert_eq!(
        h.orchestrator.get(&stranded.id).unwrap().status,
        GenerationStatus::Processing
    );
}

// =============================================================================
// Stats
// =============================================================================

#[tokio::test]
async fn stats_cover_finished_generations() {
    let ok = harness(
        ScriptedAdapter::new(Provider::OpenAi)
            .when_polls_exhausted(|| Ok(PollReport::completed())),
        fast(5),
    );
    for _ in 0..2 {
        let record = ok.orchestrator.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
        ok.orchestrator.wait(&record.id, WAIT).await.unwrap();
    }
    let err = ok
        .orchestrator
        .create(make_test_spec("sora-2", 5), "missing-ref")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::AuthNotConfigured { .. }));

    let stats = ok.orchestrator.stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 2);
    assert_float_eq!(stats.total_cost_usd, 1.0);
    assert_float_eq!(stats.success_rate.unwrap(), 1.0);
    assert_eq!(stats.by_provider[&Provider::OpenAi].count, 2);
    assert_eq!(stats.by_model["sora-2"].completed, 2);
}

// =============================================================================
// Real stores
// =============================================================================

#[tokio::test]
async fn sqlite_and_filesystem_stores_end_to_end() {
    let dir = TestDir::new();
    let records = SqliteRecordStore::open(&dir.file_path("records.db")).unwrap();
    let blobs = FsBlobStore::new(dir.file_path("videos"));
    let adapter = ScriptedAdapter::new(Provider::OpenAi).with_polls(vec![
        Ok(PollReport {
            status: CanonicalStatus::Processing,
            progress: Some(60),
            failure_reason: None,
        }),
        Ok(PollReport::completed()),
    ]);
    let orch = Orchestrator::builder(
        ProviderRegistry::new().with_adapter(Arc::new(adapter)),
        Arc::new(records),
        Arc::new(blobs),
        Arc::new(MemoryCredentialStore::new().with_key("openai", "sk-test")),
    )
    .policy(fast(5))
    .build();

    let record = orch.create(make_test_spec("sora-2", 5), "openai").await.unwrap();
    let done = orch.wait(&record.id, WAIT).await.unwrap();

    let location = done.content_location.unwrap();
    assert!(location.ends_with(&format!("{}.mp4", record.id)));
    assert!(std::path::Path::new(&location).exists());

    orch.delete(&record.id).await.unwrap();
    assert!(!std::path::Path::new(&location).exists());
    assert!(orch.list(&RecordFilter::default()).unwrap().is_empty());
}
