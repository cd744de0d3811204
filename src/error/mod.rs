//! Error types for vidgate.
//!
//! Uses `thiserror` for structured error types that map to exit codes and to
//! the machine-readable failure kind stored on failed generation records.
//!
//! ## Error Taxonomy
//!
//! - **Authentication**: missing or rejected provider credentials
//! - **Validation**: bad specs, unknown models, provider 4xx rejections
//! - **Transient**: transport errors, 429 and 5xx answers; retried inside the
//!   poll budget and never written to a record directly
//! - **Provider**: terminal provider-side outcomes (reported failure, poll
//!   budget exhausted, content unreachable)
//! - **Lifecycle**: unknown ids and illegal state transitions
//! - **Configuration**, **Storage**, **Internal**
//!
//! Each error has a stable code (e.g. `VG-A001`) for programmatic handling.

pub mod suggestions;

use std::time::Duration;
use thiserror::Error;

use crate::core::models::FailureKind;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    Validation,
    Transient,
    Provider,
    Lifecycle,
    Configuration,
    Storage,
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Validation => "Validation error",
            Self::Transient => "Transient provider error",
            Self::Provider => "Provider error",
            Self::Lifecycle => "Generation lifecycle error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Validation => "V",
            Self::Transient => "T",
            Self::Provider => "P",
            Self::Lifecycle => "L",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Unexpected failure, provider failure, storage failure.
    GeneralError = 1,
    /// Credential missing or rejected.
    AuthError = 2,
    /// Invalid request, config, or unknown model.
    InvalidInput = 3,
    /// Request or poll budget timed out.
    Timeout = 4,
    /// Generation id not found.
    NotFound = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for vidgate operations.
#[derive(Error, Debug)]
pub enum GateError {
    // ==========================================================================
    // Authentication errors
    // ==========================================================================
    /// No credential stored under the key ref.
    #[error("no credential configured for {provider} (key ref '{key_ref}')")]
    AuthNotConfigured { provider: String, key_ref: String },

    /// The provider rejected the credential.
    #[error("credential rejected by {provider}: {reason}")]
    AuthInvalid { provider: String, reason: String },

    // ==========================================================================
    // Validation errors
    // ==========================================================================
    /// The generation spec failed local validation.
    #[error("invalid generation request: {0}")]
    InvalidSpec(String),

    /// No provider serves this model.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The provider refused the request parameters (4xx).
    #[error("{provider} rejected the request: {message}")]
    ProviderRejected {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    // ==========================================================================
    // Transient errors
    // ==========================================================================
    /// Connection-level failure.
    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    /// A single call exceeded its timeout.
    #[error("request to {provider} timed out after {seconds}s")]
    RequestTimeout { provider: String, seconds: u64 },

    /// HTTP 429.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// HTTP 5xx.
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    // ==========================================================================
    // Provider outcomes
    // ==========================================================================
    /// The provider answered with a body we could not interpret.
    #[error("unexpected response from {provider}: {message}")]
    ParseResponse { provider: String, message: String },

    /// The provider reported the job as failed.
    #[error("{provider} reported the generation as failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    /// The poll budget ran out before a terminal status.
    #[error("timed out after {attempts} status checks{}", last_error_suffix(.last_error.as_deref()))]
    PollTimeout {
        attempts: u32,
        last_error: Option<String>,
    },

    /// The job completed but its content could not be fetched or stored.
    #[error("content retrieval from {provider} failed: {message}")]
    ContentRetrieval { provider: String, message: String },

    // ==========================================================================
    // Lifecycle errors
    // ==========================================================================
    /// No record with this id.
    #[error("generation not found: {0}")]
    NotFound(String),

    /// A transition the state machine does not allow.
    #[error("illegal transition for {id}: {from} -> {to}")]
    IllegalTransition { id: String, from: String, to: String },

    /// `wait` gave up before the generation reached a terminal state.
    #[error("generation {id} still {status} after waiting {seconds}s")]
    WaitTimeout {
        id: String,
        status: String,
        seconds: u64,
    },

    /// The generation reached `failed` (surfaced by commands that wait).
    #[error("generation {id} failed ({kind}): {message}")]
    GenerationFailed {
        id: String,
        kind: FailureKind,
        message: String,
    },

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// The provider is switched off in config.
    #[error("provider {0} is disabled")]
    ProviderDisabled(String),

    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Storage errors
    // ==========================================================================
    /// Record store failure.
    #[error("record store error: {0}")]
    Storage(String),

    /// OS keyring failure.
    #[error("credential store error: {0}")]
    CredentialStore(String),

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn last_error_suffix(last_error: Option<&str>) -> String {
    last_error.map_or_else(String::new, |e| format!(" (last error: {e})"))
}

impl GateError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthNotConfigured { .. } | Self::AuthInvalid { .. } => ExitCode::AuthError,

            Self::InvalidSpec(_)
            | Self::UnknownModel(_)
            | Self::ProviderRejected { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::ProviderDisabled(_)
            | Self::Config(_)
            | Self::IllegalTransition { .. } => ExitCode::InvalidInput,

            Self::RequestTimeout { .. } | Self::PollTimeout { .. } | Self::WaitTimeout { .. } => {
                ExitCode::Timeout
            }

            Self::NotFound(_) => ExitCode::NotFound,

            Self::Network { .. }
            | Self::RateLimited { .. }
            | Self::ProviderUnavailable { .. }
            | Self::ParseResponse { .. }
            | Self::ProviderFailed { .. }
            | Self::ContentRetrieval { .. }
            | Self::GenerationFailed { .. }
            | Self::Storage(_)
            | Self::CredentialStore(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthNotConfigured { .. } | Self::AuthInvalid { .. } => {
                ErrorCategory::Authentication
            }

            Self::InvalidSpec(_) | Self::UnknownModel(_) | Self::ProviderRejected { .. } => {
                ErrorCategory::Validation
            }

            Self::Network { .. }
            | Self::RequestTimeout { .. }
            | Self::RateLimited { .. }
            | Self::ProviderUnavailable { .. } => ErrorCategory::Transient,

            Self::ParseResponse { .. }
            | Self::ProviderFailed { .. }
            | Self::PollTimeout { .. }
            | Self::ContentRetrieval { .. } => ErrorCategory::Provider,

            Self::NotFound(_)
            | Self::IllegalTransition { .. }
            | Self::WaitTimeout { .. }
            | Self::GenerationFailed { .. } => ErrorCategory::Lifecycle,

            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::ProviderDisabled(_)
            | Self::Config(_) => ErrorCategory::Configuration,

            Self::Storage(_) | Self::CredentialStore(_) => ErrorCategory::Storage,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `VG-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthNotConfigured { .. } => "VG-A001",
            Self::AuthInvalid { .. } => "VG-A002",

            Self::InvalidSpec(_) => "VG-V001",
            Self::UnknownModel(_) => "VG-V002",
            Self::ProviderRejected { .. } => "VG-V003",

            Self::Network { .. } => "VG-T001",
            Self::RequestTimeout { .. } => "VG-T002",
            Self::RateLimited { .. } => "VG-T003",
            Self::ProviderUnavailable { .. } => "VG-T004",

            Self::ParseResponse { .. } => "VG-P001",
            Self::ProviderFailed { .. } => "VG-P002",
            Self::PollTimeout { .. } => "VG-P003",
            Self::ContentRetrieval { .. } => "VG-P004",

            Self::NotFound(_) => "VG-L001",
            Self::IllegalTransition { .. } => "VG-L002",
            Self::WaitTimeout { .. } => "VG-L003",
            Self::GenerationFailed { .. } => "VG-L004",

            Self::ConfigNotFound { .. } => "VG-C001",
            Self::ConfigParse { .. } => "VG-C002",
            Self::ConfigInvalid { .. } => "VG-C003",
            Self::ProviderDisabled(_) => "VG-C004",
            Self::Config(_) => "VG-C099",

            Self::Storage(_) => "VG-S001",
            Self::CredentialStore(_) => "VG-S002",

            Self::Io(_) => "VG-X001",
            Self::Json(_) => "VG-X002",
            Self::Other(_) => "VG-X099",
        }
    }

    /// Whether the error is a retryable provider hiccup.
    ///
    /// The poller spends one attempt on these instead of failing the record.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// The failure kind recorded when this error ends a generation.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::AuthNotConfigured { .. } | Self::AuthInvalid { .. } => FailureKind::Auth,
            Self::InvalidSpec(_) | Self::UnknownModel(_) | Self::ProviderRejected { .. } => {
                FailureKind::Validation
            }
            Self::Network { .. }
            | Self::RequestTimeout { .. }
            | Self::RateLimited { .. }
            | Self::ProviderUnavailable { .. } => FailureKind::Transport,
            Self::PollTimeout { .. } => FailureKind::Timeout,
            Self::ContentRetrieval { .. } => FailureKind::ContentRetrieval,
            Self::GenerationFailed { kind, .. } => *kind,
            _ => FailureKind::ProviderFailed,
        }
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::AuthNotConfigured { provider, .. }
            | Self::AuthInvalid { provider, .. }
            | Self::ProviderRejected { provider, .. }
            | Self::Network { provider, .. }
            | Self::RequestTimeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ProviderUnavailable { provider, .. }
            | Self::ParseResponse { provider, .. }
            | Self::ProviderFailed { provider, .. }
            | Self::ContentRetrieval { provider, .. } => Some(provider),
            Self::ProviderDisabled(p) => Some(p),
            _ => None,
        }
    }

    /// Returns actionable fix suggestions for this error.
    ///
    /// ```
    /// use vidgate::error::GateError;
    ///
    /// let err = GateError::UnknownModel("veo-3".to_string());
    /// assert!(!err.fix_suggestions().is_empty());
    /// ```
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::AuthNotConfigured { provider, key_ref } => {
                suggestions::auth_not_configured_suggestions(provider, key_ref)
            }
            Self::AuthInvalid { provider, reason } => {
                suggestions::auth_invalid_suggestions(provider, reason)
            }

            Self::InvalidSpec(message) => suggestions::invalid_spec_suggestions(message),
            Self::UnknownModel(model) => suggestions::unknown_model_suggestions(model),
            Self::ProviderRejected {
                provider,
                status_code,
                message,
            } => suggestions::provider_rejected_suggestions(provider, *status_code, message),

            Self::Network { provider, message } => {
                suggestions::network_suggestions(provider, message)
            }
            Self::RequestTimeout { provider, seconds } => {
                suggestions::request_timeout_suggestions(provider, *seconds)
            }
            Self::RateLimited {
                provider,
                retry_after,
                message,
            } => suggestions::rate_limited_suggestions(provider, *retry_after, message),
            Self::ProviderUnavailable {
                provider, message, ..
            } => suggestions::provider_unavailable_suggestions(provider, message),

            Self::ParseResponse { provider, message } => vec![FixSuggestion::new(
                vec![format!("vidgate keys validate {provider}")],
                format!("{provider} returned an unexpected payload ({message}). The API may have changed."),
            )],
            Self::ProviderFailed { provider, reason } => vec![FixSuggestion::new(
                vec!["vidgate generate ...".to_string()],
                format!("{provider} could not render this video: {reason}. Adjusting the prompt often helps."),
            )],
            Self::PollTimeout { attempts, .. } => suggestions::poll_timeout_suggestions(*attempts),
            Self::ContentRetrieval { provider, message } => {
                suggestions::content_retrieval_suggestions(provider, message)
            }

            Self::NotFound(id) => suggestions::not_found_suggestions(id),
            Self::IllegalTransition { id, .. } => vec![FixSuggestion::new(
                vec![format!("vidgate get {id}")],
                "The generation is not in a state that allows this change.",
            )],
            Self::WaitTimeout { id, .. } => vec![FixSuggestion::new(
                vec![format!("vidgate get {id}")],
                "The generation is still running; check on it later.",
            )],
            Self::GenerationFailed { id, .. } => vec![FixSuggestion::new(
                vec![format!("vidgate get {id} --json")],
                "Inspect the stored error and error_kind for details.",
            )],

            Self::ConfigNotFound { path } => suggestions::config_not_found_suggestions(path),
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid {
                key,
                value,
                message,
            } => suggestions::config_invalid_suggestions(key, value, message),
            Self::ProviderDisabled(provider) => {
                suggestions::provider_disabled_suggestions(provider)
            }
            Self::Config(message) => vec![FixSuggestion::new(
                vec!["# Check $VIDGATE_CONFIG or the default config.toml".to_string()],
                format!("Configuration error: {message}"),
            )],

            Self::Storage(message) => vec![FixSuggestion::new(
                vec!["# Check permissions on the vidgate data directory".to_string()],
                format!("The generation record store failed: {message}"),
            )],
            Self::CredentialStore(message) => vec![FixSuggestion::new(
                vec!["export VIDGATE_KEY_<REF>=<api key>".to_string()],
                format!("The OS keyring is unavailable ({message}); environment keys still work."),
            )],

            Self::Io(err) => vec![FixSuggestion::new(
                vec!["# Check file permissions and disk space".to_string()],
                format!("I/O error: {err}."),
            )],
            Self::Json(err) => vec![FixSuggestion::new(
                Vec::new(),
                format!("JSON error: {err}. Stored data may be corrupted."),
            )],
            Self::Other(err) => vec![FixSuggestion::new(
                Vec::new(),
                format!("Unexpected error: {err}. Please report this issue."),
            )],
        }
    }
}

/// Result type alias for vidgate operations.
pub type Result<T> = std::result::Result<T, GateError>;

// =============================================================================
// Tests
// =============================================================================
