//! Fix suggestions for vidgate errors.
//!
//! Maps error variants to copy-paste ready commands plus a short explanation
//! of what went wrong.

use std::time::Duration;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Commands to run, in order of preference.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,

    /// Link to documentation for more information.
    pub doc_url: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
            doc_url: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }

    /// Builder: adds documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }
}

/// Returns the API-key documentation page for a provider.
#[must_use]
pub fn key_doc_for_provider(provider: &str) -> Option<String> {
    match provider {
        "openai" => Some("https://platform.openai.com/api-keys".to_string()),
        "runway" => Some("https://dev.runwayml.com/".to_string()),
        "kling" => Some("https://klingai.com/dev-center".to_string()),
        _ => None,
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Suggestions when no credential is stored under the requested key ref.
#[must_use]
pub fn auth_not_configured_suggestions(provider: &str, key_ref: &str) -> Vec<FixSuggestion> {
    let mut suggestion = FixSuggestion::new(
        vec![
            format!("vidgate keys set {provider} --key-ref {key_ref}"),
            format!("export {}=<api key>", env_var_for_key_ref(key_ref)),
        ],
        format!(
            "No API key is stored under '{key_ref}' for {provider}. Store one in the \
             OS keyring or export it in the environment."
        ),
    );
    if let Some(url) = key_doc_for_provider(provider) {
        suggestion = suggestion.with_doc_url(url);
    }
    vec![suggestion]
}

/// Suggestions when the provider rejected the credential.
#[must_use]
pub fn auth_invalid_suggestions(provider: &str, reason: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("vidgate keys validate {provider}"),
                format!("vidgate keys set {provider}"),
            ],
            format!(
                "{provider} rejected the API key: {reason}. The key may have been \
                 revoked, rotated, or belong to a different organization."
            ),
        )
        .with_prevention("Re-validate keys after rotating them with `vidgate keys validate`."),
    ]
}

/// Suggestions for a spec that failed local validation.
#[must_use]
pub fn invalid_spec_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["vidgate providers".to_string()],
        format!(
            "The generation request is invalid: {message}. Check the provider's \
             maximum duration and supported aspect ratios."
        ),
    )]
}

/// Suggestions for a model with no known provider.
#[must_use]
pub fn unknown_model_suggestions(model: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["vidgate providers".to_string(), "vidgate pricing".to_string()],
        format!("'{model}' is not a model served by any configured provider."),
    )]
}

/// Suggestions for a request the provider refused.
#[must_use]
pub fn provider_rejected_suggestions(
    provider: &str,
    status_code: Option<u16>,
    message: &str,
) -> Vec<FixSuggestion> {
    let status = status_code.map_or_else(String::new, |c| format!(" (HTTP {c})"));
    vec![FixSuggestion::new(
        vec![format!("vidgate providers --provider {provider}")],
        format!(
            "{provider} refused the request{status}: {message}. Adjust the prompt or \
             parameters; this request will not succeed on retry."
        ),
    )]
}

/// Suggestions for a transport-level failure.
#[must_use]
pub fn network_suggestions(provider: &str, message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("vidgate keys validate {provider}"),
                "# Check proxy settings: HTTPS_PROXY / NO_PROXY".to_string(),
            ],
            format!("Could not reach {provider}: {message}."),
        )
        .with_prevention("Verify network connectivity and any configured `api_base` override."),
    ]
}

/// Suggestions for a single request that exceeded its timeout.
#[must_use]
pub fn request_timeout_suggestions(provider: &str, seconds: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("vidgate --timeout {} generate ...", seconds * 2)],
            format!("{provider} did not answer within {seconds}s."),
        )
        .with_prevention(
            "Raise `general.request_timeout_seconds` in the config file if the provider \
             is consistently slow.",
        ),
    ]
}

/// Suggestions for rate limiting.
#[must_use]
pub fn rate_limited_suggestions(
    provider: &str,
    retry_after: Option<Duration>,
    message: &str,
) -> Vec<FixSuggestion> {
    let wait = retry_after.map_or_else(
        || "a short while".to_string(),
        |d| format!("{} seconds", d.as_secs()),
    );
    vec![
        FixSuggestion::new(
            vec![format!("sleep {} && vidgate resume", retry_after.map_or(60, |d| d.as_secs()))],
            format!("{provider} is rate limiting requests ({message}). Wait {wait} and try again."),
        )
        .with_prevention("Lower concurrency or raise `polling.interval_ms`."),
    ]
}

/// Suggestions for a provider outage.
#[must_use]
pub fn provider_unavailable_suggestions(provider: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["vidgate resume".to_string()],
        format!(
            "{provider} is temporarily unavailable: {message}. Generations already \
             submitted keep polling and can be resumed later."
        ),
    )]
}

/// Suggestions for a generation whose status checks ran out.
#[must_use]
pub fn poll_timeout_suggestions(attempts: u32) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["vidgate list --status failed".to_string()],
            format!(
                "The provider did not report a final state after {attempts} status checks."
            ),
        )
        .with_prevention("Raise `polling.max_attempts` for long renders."),
    ]
}

/// Suggestions when the video finished but could not be downloaded.
#[must_use]
pub fn content_retrieval_suggestions(provider: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("vidgate keys validate {provider}")],
        format!(
            "{provider} finished the video but it could not be retrieved: {message}. \
             Download links may have expired."
        ),
    )]
}

/// Suggestions for an unknown generation id.
#[must_use]
pub fn not_found_suggestions(id: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["vidgate list".to_string()],
        format!("No generation with id '{id}' exists in the local record store."),
    )]
}

/// Suggestions for a missing config file.
#[must_use]
pub fn config_not_found_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("touch {path}")],
        format!("The config file {path} does not exist. vidgate runs with defaults without one."),
    )]
}

/// Suggestions for a config file that failed to parse.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        format!("The config file {path} is not valid TOML: {message}."),
    )]
}

/// Suggestions for an out-of-range config value.
#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["vidgate providers".to_string()],
        format!("Config key '{key}' has invalid value '{value}': {message}."),
    )]
}

/// Suggestions for a disabled provider.
#[must_use]
pub fn provider_disabled_suggestions(provider: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("# set providers.{provider}.enabled = true in config.toml")],
        format!("The {provider} provider is disabled in the configuration."),
    )]
}

/// Environment variable consulted for a key ref before the OS keyring.
#[must_use]
pub fn env_var_for_key_ref(key_ref: &str) -> String {
    let normalized: String = key_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("VIDGATE_KEY_{normalized}")
}

// =============================================================================
// Tests
// =============================================================================
