//! Test utilities for vidgate.
//!
//! Provides a scripted in-process adapter, test data factories, and
//! assertion macros for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vidgate::test_utils::*;
//!
//! let adapter = ScriptedAdapter::new(Provider::OpenAi)
//!     .with_polls(vec![Ok(PollReport::processing(Some(50))), Ok(PollReport::completed())]);
//! let dir = TestDir::new();
//! dir.create_file("config.toml", "[polling]\ninterval_ms = 10");
//! ```

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::core::models::{
    ContentMetadata, FetchedContent, GenerationRecord, GenerationSpec, PollReport, Transition,
};
use crate::core::provider::Provider;
use crate::error::{GateError, Result};
use crate::providers::{ContentAuth, ProviderFeatures, VideoAdapter};
use crate::storage::credentials::Credential;

// =============================================================================
// Scripted Adapter
// =============================================================================

type ValidateFn = Box<dyn Fn(&Credential) -> Result<bool> + Send + Sync>;
type SubmitFn = Box<dyn Fn(&GenerationSpec) -> Result<String> + Send + Sync>;
type PollFn = Box<dyn Fn() -> Result<PollReport> + Send + Sync>;
type FetchFn = Box<dyn Fn(&str) -> Result<FetchedContent> + Send + Sync>;

/// An in-process [`VideoAdapter`] whose answers are scripted by the test.
///
/// Defaults: credentials validate, submit returns `job_<n>`, polls report
/// `processing` once the script runs out, fetch returns a small MP4.
///
/// # Examples
///
/// ```rust,ignore
/// let adapter = ScriptedAdapter::new(Provider::Runway)
///     .with_polls(vec![Ok(PollReport::failed("nsfw"))]);
/// ```
pub struct ScriptedAdapter {
    provider: Provider,
    validate: ValidateFn,
    submit: SubmitFn,
    polls: Mutex<VecDeque<Result<PollReport>>>,
    when_exhausted: PollFn,
    fetch: FetchFn,
    submit_delay: Duration,
    poll_delay: Duration,
    fetch_delay: Duration,
    validate_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    secrets_seen: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            validate: Box::new(|_| Ok(true)),
            submit: Box::new(|_| Ok(format!("job_{}", uuid::Uuid::new_v4().simple()))),
            polls: Mutex::new(VecDeque::new()),
            when_exhausted: Box::new(|| Ok(PollReport::processing(None))),
            fetch: Box::new(|_| Ok(make_test_content(5.0))),
            submit_delay: Duration::ZERO,
            poll_delay: Duration::ZERO,
            fetch_delay: Duration::ZERO,
            validate_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            secrets_seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer credential checks with `valid`.
    #[must_use]
    pub fn with_validate(mut self, valid: bool) -> Self {
        self.validate = Box::new(move |_| Ok(valid));
        self
    }

    /// Answer credential checks with the closure's result.
    #[must_use]
    pub fn with_validate_fn(
        mut self,
        f: impl Fn(&Credential) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Box::new(f);
        self
    }

    #[must_use]
    pub fn with_submit(
        mut self,
        f: impl Fn(&GenerationSpec) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.submit = Box::new(f);
        self
    }

    /// Status answers, in order.
    #[must_use]
    pub fn with_polls(self, polls: Vec<Result<PollReport>>) -> Self {
        if let Ok(mut queue) = self.polls.lock() {
            queue.extend(polls);
        }
        self
    }

    /// Answer for every poll after the script runs out.
    #[must_use]
    pub fn when_polls_exhausted(
        mut self,
        f: impl Fn() -> Result<PollReport> + Send + Sync + 'static,
    ) -> Self {
        self.when_exhausted = Box::new(f);
        self
    }

    #[must_use]
    pub fn with_fetch(
        mut self,
        f: impl Fn(&str) -> Result<FetchedContent> + Send + Sync + 'static,
    ) -> Self {
        self.fetch = Box::new(f);
        self
    }

    #[must_use]
    pub const fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    #[must_use]
    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every secret the adapter was called with, in call order.
    #[must_use]
    pub fn secrets_seen(&self) -> Vec<String> {
        self.secrets_seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn saw(&self, credential: &Credential) {
        if let Ok(mut seen) = self.secrets_seen.lock() {
            seen.push(credential.expose().to_string());
        }
    }
}

#[async_trait]
impl VideoAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            max_duration_seconds: 20,
            aspect_ratios: &["16:9", "9:16", "1:1"],
            supports_seed: true,
            supports_fps: true,
        }
    }

    fn content_auth(&self) -> ContentAuth {
        ContentAuth::Bearer
    }

    async fn validate(&self, credential: &Credential) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.saw(credential);
        (self.validate)(credential)
    }

    async fn submit(&self, spec: &GenerationSpec, credential: &Credential) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.saw(credential);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        (self.submit)(spec)
    }

    async fn poll(&self, _job_id: &str, credential: &Credential) -> Result<PollReport> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.saw(credential);
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let next = self
            .polls
            .lock()
            .map_err(|_| GateError::Storage("poll script lock poisoned".to_string()))?
            .pop_front();
        next.unwrap_or_else(|| (self.when_exhausted)())
    }

    async fn fetch(&self, job_id: &str, credential: &Credential) -> Result<FetchedContent> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.saw(credential);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        (self.fetch)(job_id)
    }
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// A 16:9 spec for `model`.
#[must_use]
pub fn make_test_spec(model: &str, duration_seconds: u32) -> GenerationSpec {
    GenerationSpec::new(model, "a red fox running through snow", duration_seconds)
        .with_aspect_ratio("16:9")
}

/// Small MP4 payload reporting `duration_seconds` at 1280x720.
#[must_use]
pub fn make_test_content(duration_seconds: f64) -> FetchedContent {
    FetchedContent {
        bytes: b"\x00\x00\x00\x18ftypmp42fake-video".to_vec(),
        content_type: "video/mp4".to_string(),
        metadata: ContentMetadata {
            duration_seconds: Some(duration_seconds),
            width: Some(1280),
            height: Some(720),
        },
    }
}

/// Fresh `queued` record for `model`.
///
/// # Panics
///
/// Panics if `model` is not routed to a provider.
#[must_use]
pub fn make_test_record(model: &str) -> GenerationRecord {
    let provider = Provider::for_model(model).expect("test model must be routed");
    GenerationRecord::new(
        provider,
        make_test_spec(model, 5),
        provider.default_key_ref(),
        Some(0.5),
        Utc::now(),
    )
}

/// A `completed` record for `model` that cost `cost_usd`.
///
/// # Panics
///
/// Panics if `model` is not routed to a provider.
#[must_use]
pub fn make_test_completed_record(model: &str, cost_usd: f64) -> GenerationRecord {
    let mut record = make_test_record(model);
    let now = Utc::now();
    record
        .apply(
            &Transition::Submitted {
                provider_job_id: "job_test".to_string(),
            },
            now,
        )
        .expect("queued -> processing");
    record
        .apply(
            &Transition::Completed {
                content_location: format!("memory://{}", record.id),
                metadata: make_test_content(5.0).metadata,
                cost_usd: Some(cost_usd),
            },
            now,
        )
        .expect("processing -> completed");
    record
}

/// Config file with short polling and every provider enabled.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
request_timeout_seconds = 10
fetch_timeout_seconds = 60

[polling]
interval_ms = 10
max_attempts = 50

[providers.openai]
key_ref = "openai"

[providers.runway]
enabled = true

[providers.kling]
api_base = "http://127.0.0.1:9/kling"

[output]
color = false
"#
    .to_string()
}

// =============================================================================
// Temp Directory Utilities
// =============================================================================

/// A temporary directory for tests with automatic cleanup.
///
/// Creates an isolated directory that is automatically deleted when
/// the `TestDir` is dropped. Uses the `tempfile` crate internally.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
            panic!(
                "Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}",
                e, json
            );
        }
    };
}

/// Assert approximate floating point equality.
///
/// ```rust,ignore
/// assert_float_eq!(0.5, 0.5000000001);
/// assert_float_eq!(0.1 + 0.2, 0.3, 0.001); // custom epsilon
/// ```
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = 1e-9;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
    ($left:expr, $right:expr, $epsilon:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = $epsilon;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Check if a string contains ANSI escape sequences.
#[must_use]
pub fn has_ansi_codes(text: &str) -> bool {
    text.contains('\x1b')
}

/// Strip ANSI escape codes from a string.
#[must_use]
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}
